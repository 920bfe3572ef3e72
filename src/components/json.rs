// src/components/json.rs

use serde_json::Value;

use crate::component::{StageFuture, Transform};
use crate::datum::Datum;
use crate::errors::StageResult;

/// Parses string documents as JSON.
///
/// Any other document passes through untouched. A string that is not valid
/// JSON is a processing error for that unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecode;

impl Transform for JsonDecode {
    fn transform(&self, datum: Datum) -> StageFuture<'_, StageResult<Vec<Datum>>> {
        Box::pin(async move {
            let Value::String(raw) = datum.document() else {
                return Ok(vec![datum]);
            };

            let parsed: Value = serde_json::from_str(raw)?;
            let mut out = Datum::new(parsed);
            if let Some(id) = datum.id() {
                out = out.with_id(id);
            }
            Ok(vec![out])
        })
    }
}
