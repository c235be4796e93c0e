pub mod error;

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

pub use error::Error;

pub type FlowResult<T> = Result<T, Error>;

/// An immutable, cheaply-cloneable set of record batches representing the
/// full contents of one table at one point in the pipeline.
#[derive(Clone, Debug)]
pub struct TableStream(pub Arc<Vec<RecordBatch>>);

impl TableStream {
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        TableStream(Arc::new(batches))
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.0
    }

    pub fn num_rows(&self) -> usize {
        self.0.iter().map(|b| b.num_rows()).sum()
    }

    pub fn schema(&self) -> Option<SchemaRef> {
        self.0.first().map(|b| b.schema())
    }

    /// Collapse into a single batch. Errors if the stream holds no batches,
    /// since a table without a schema cannot be materialized.
    pub fn concat(&self) -> FlowResult<RecordBatch> {
        match self.0.as_slice() {
            [] => Err(Error::Arrow(arrow::error::ArrowError::InvalidArgumentError(
                "cannot concat an empty table stream".to_string(),
            ))),
            [single] => Ok(single.clone()),
            batches => Ok(concat_batches(&batches[0].schema(), batches)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::StringArray;
    use arrow::datatypes::{DataType, Field, Schema};

    fn batch(values: Vec<Option<&str>>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Utf8, true)]));
        RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from(values))],
        )
        .unwrap()
    }

    #[test]
    fn num_rows_sums_batches() {
        let stream = TableStream::new(vec![
            batch(vec![Some("a"), Some("b")]),
            batch(vec![None]),
        ]);
        assert_eq!(stream.num_rows(), 3);
    }

    #[test]
    fn concat_merges_batches() {
        let stream = TableStream::new(vec![
            batch(vec![Some("a")]),
            batch(vec![Some("b"), None]),
        ]);
        let merged = stream.concat().unwrap();
        assert_eq!(merged.num_rows(), 3);
    }

    #[test]
    fn concat_of_empty_stream_errors() {
        let stream = TableStream::new(vec![]);
        assert!(stream.concat().is_err());
    }
}
