use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, BooleanBuilder, Float64Builder, StringBuilder, TimestampMillisecondBuilder},
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{path::Path, sync::Arc};
use tracing::{debug, info};

use super::temp_file_for;
use crate::store::{ColumnKind, FilteredView, Value};

/// Arrow type for a column: numeric → Float64, date → Timestamp(ms),
/// all-boolean categorical → Boolean, anything else → Utf8.
fn arrow_type<'a>(kind: ColumnKind, values: impl Iterator<Item = &'a Value>) -> DataType {
    match kind {
        ColumnKind::Numeric => DataType::Float64,
        ColumnKind::Date => DataType::Timestamp(TimeUnit::Millisecond, None),
        ColumnKind::Categorical => {
            let mut seen_bool = false;
            for v in values {
                match v {
                    Value::Bool(_) => seen_bool = true,
                    Value::Missing => {}
                    _ => return DataType::Utf8,
                }
            }
            if seen_bool {
                DataType::Boolean
            } else {
                DataType::Utf8
            }
        }
    }
}

fn build_array<'a>(dt: &DataType, values: impl Iterator<Item = &'a Value>) -> ArrayRef {
    match dt {
        DataType::Float64 => {
            let mut b = Float64Builder::new();
            for v in values {
                b.append_option(v.as_f64());
            }
            Arc::new(b.finish())
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            let mut b = TimestampMillisecondBuilder::new();
            for v in values {
                b.append_option(match v {
                    Value::Date(d) => Some(d.and_utc().timestamp_millis()),
                    _ => None,
                });
            }
            Arc::new(b.finish())
        }
        DataType::Boolean => {
            let mut b = BooleanBuilder::new();
            for v in values {
                b.append_option(match v {
                    Value::Bool(x) => Some(*x),
                    _ => None,
                });
            }
            Arc::new(b.finish())
        }
        _ => {
            let mut b = StringBuilder::new();
            for v in values {
                match v {
                    Value::Missing => b.append_null(),
                    v => b.append_value(v.to_string()),
                }
            }
            Arc::new(b.finish())
        }
    }
}

/// Convert the rows of `view` into a single Arrow batch, one nullable field
/// per record-set column.
pub fn to_record_batch(view: &FilteredView<'_>) -> Result<RecordBatch> {
    let set = view.record_set();
    let mut fields = Vec::with_capacity(set.columns().len());
    let mut arrays = Vec::with_capacity(set.columns().len());

    for col in set.columns() {
        let dt = arrow_type(col.kind, view.column_values(&col.name)?);
        debug!(column = %col.name, data_type = ?dt, "mapped column to arrow type");
        arrays.push(build_array(&dt, view.column_values(&col.name)?));
        fields.push(Field::new(&col.name, dt, /* nullable = */ true));
    }

    let schema = Arc::new(Schema::new(fields));
    RecordBatch::try_new(schema, arrays).context("assembling record batch")
}

/// Write the view as a Snappy-compressed Parquet file, via a temp file and
/// rename.
pub fn export_parquet(view: &FilteredView<'_>, path: &Path) -> Result<usize> {
    let batch = to_record_batch(view)?;

    let tmp = temp_file_for(path)
        .with_context(|| format!("creating temp file for {}", path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(tmp.as_file(), batch.schema(), Some(props))
        .context("initializing Parquet writer")?;
    writer.write(&batch).context("writing batch to Parquet")?;
    writer.close().context("closing Parquet writer")?;

    tmp.persist(path)
        .with_context(|| format!("renaming export into {}", path.display()))?;
    info!(rows = batch.num_rows(), path = %path.display(), "exported parquet");
    Ok(batch.num_rows())
}
