// Submission body extractor
//
// The intake form posts `multipart/form-data`; scripted clients may send
// URL-encoded or JSON bodies. All three flatten into one field map.

use axum::{
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Form, Json,
};
use serde_json::{json, Map, Value};

use super::error::ApiError;

/// Submitted form fields, whatever the body encoding
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionForm(pub Map<String, Value>);

impl<S> FromRequest<S> for SubmissionForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state).await?;
            return read_multipart(multipart).await.map(SubmissionForm);
        }

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state).await?;
            let mut fields = Map::new();
            for (name, value) in pairs {
                insert_field(&mut fields, name, Value::String(value));
            }
            return Ok(SubmissionForm(fields));
        }

        let Json(fields) = Json::<Map<String, Value>>::from_request(req, state).await?;
        Ok(SubmissionForm(fields))
    }
}

/// Collect text parts as strings; file parts are recorded by name, type and size
async fn read_multipart(mut multipart: Multipart) -> Result<Map<String, Value>, ApiError> {
    let mut fields = Map::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        let value = match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?;
                // Browsers send an empty part for an untouched file input
                if file_name.is_empty() && data.is_empty() {
                    continue;
                }
                json!({
                    "fileName": file_name,
                    "contentType": content_type,
                    "size": data.len(),
                })
            }
            None => Value::String(field.text().await?),
        };

        insert_field(&mut fields, name, value);
    }

    Ok(fields)
}

/// Repeated names (checkbox groups, owner rows) collect into an array
fn insert_field(fields: &mut Map<String, Value>, name: String, value: Value) {
    match fields.get_mut(&name) {
        Some(Value::Array(values)) => values.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            fields.insert(name, value);
        }
    }
}
