//! Resolution of field-read leaves against the in-flight payload and the organization's
//! ingested data.

use crate::ast::{FieldType, Value};
use crate::data::{DataModel, Payload};
use crate::error::EvaluationError;
use crate::repository::{DbFieldReadParams, IngestedDataReader, ReadTransaction};
use std::cell::RefCell;
use tracing::debug;
use uuid::Uuid;

/// Capability consumed by the evaluator to resolve field-read leaves.
pub trait DataAccessor {
    /// Reads a field of the object being evaluated. No I/O.
    fn payload_field(&self, field_name: &str) -> Option<Value>;

    /// Checks that `path` and `field_name` resolve in the data model and that the column
    /// can be read as `field_type`. Independent of whether any row exists.
    fn validate_db_field_read(
        &self,
        path: &[String],
        field_name: &str,
        field_type: FieldType,
    ) -> Result<(), EvaluationError>;

    /// Reads a field reached through `path` from the object. `Ok(None)` when absent.
    fn db_field(&self, path: &[String], field_name: &str) -> Result<Option<Value>, EvaluationError>;
}

/// Accessor bound to one organization, one data model and one payload.
///
/// The read transaction is opened on the first database read and kept for every later
/// read of the same object; it is released when the accessor is dropped.
pub struct ScopedDataAccessor<'a> {
    organization_id: Uuid,
    data_model: &'a DataModel,
    payload: &'a Payload,
    reader: &'a dyn IngestedDataReader,
    transaction: RefCell<Option<Box<dyn ReadTransaction + 'a>>>,
}

impl<'a> ScopedDataAccessor<'a> {
    pub fn new(
        organization_id: Uuid,
        data_model: &'a DataModel,
        payload: &'a Payload,
        reader: &'a dyn IngestedDataReader,
    ) -> Self {
        Self {
            organization_id,
            data_model,
            payload,
            reader,
            transaction: RefCell::new(None),
        }
    }

    pub fn has_open_transaction(&self) -> bool {
        self.transaction.borrow().is_some()
    }
}

impl DataAccessor for ScopedDataAccessor<'_> {
    fn payload_field(&self, field_name: &str) -> Option<Value> {
        self.payload.get(field_name).cloned()
    }

    fn validate_db_field_read(
        &self,
        path: &[String],
        field_name: &str,
        field_type: FieldType,
    ) -> Result<(), EvaluationError> {
        let field = self
            .data_model
            .resolve_db_field(&self.payload.table_name, path, field_name)
            .map_err(|e| EvaluationError::InconsistentWithDataModel(e.to_string()))?;
        if field.data_type.accepts(field_type) {
            Ok(())
        } else {
            Err(EvaluationError::InconsistentWithDataModel(format!(
                "field '{}' is stored as {:?} and cannot be read as {:?}",
                field_name, field.data_type, field_type
            )))
        }
    }

    fn db_field(&self, path: &[String], field_name: &str) -> Result<Option<Value>, EvaluationError> {
        let mut slot = self.transaction.borrow_mut();
        let transaction = match slot.take() {
            Some(transaction) => transaction,
            None => {
                debug!(organization_id = %self.organization_id, "Opening read transaction");
                self.reader
                    .begin_read(self.organization_id)
                    .map_err(|e| EvaluationError::DbReadError(e.to_string()))?
            }
        };

        let result = transaction
            .read_db_field(&DbFieldReadParams {
                data_model: self.data_model,
                trigger_table: &self.payload.table_name,
                payload: self.payload,
                path,
                field_name,
            })
            .map_err(|e| EvaluationError::DbReadError(e.to_string()));
        *slot = Some(transaction);
        result
    }
}
