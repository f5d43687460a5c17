//! Firestore REST adapter for the note collection.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use super::{RemoteNoteStore, StoreError, StoreResult, UserScope};
use crate::models::{Note, NoteId};
use crate::util::compact_text;

const LIST_PAGE_SIZE: &str = "300";
const CONTENT_FIELD: &str = "content";

#[derive(Clone)]
pub struct FirestoreNoteStore {
    documents_url: String,
    client: Client,
}

impl FirestoreNoteStore {
    /// `documents_url` is the database documents root, e.g.
    /// `https://firestore.googleapis.com/v1/projects/{project}/databases/(default)/documents`.
    pub fn new(documents_url: impl Into<String>) -> StoreResult<Self> {
        let documents_url = documents_url.into().trim().trim_end_matches('/').to_string();
        Ok(Self {
            documents_url,
            client: Client::builder().build()?,
        })
    }

    fn collection_url(&self, scope: &UserScope) -> String {
        format!("{}/{}", self.documents_url, scope.collection_path())
    }

    fn document_url(&self, scope: &UserScope, id: &NoteId) -> String {
        format!(
            "{}/{}",
            self.collection_url(scope),
            urlencoding::encode(id.as_str())
        )
    }

    async fn send(request: RequestBuilder, scope: &UserScope) -> StoreResult<Response> {
        let response = request.bearer_auth(&scope.access_token).send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::from_status(status, parse_api_error(status, &body)))
    }
}

impl RemoteNoteStore for FirestoreNoteStore {
    async fn list(&self, scope: &UserScope) -> StoreResult<Vec<Note>> {
        let url = self.collection_url(scope);
        let mut notes = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .query(&[("pageSize", LIST_PAGE_SIZE)]);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }

            let page = match Self::send(request, scope).await {
                Ok(response) => response.json::<ListDocumentsResponse>().await?,
                // An empty collection that was never written may 404 on emulators.
                Err(StoreError::NotFound(_)) if notes.is_empty() => return Ok(notes),
                Err(error) => return Err(error),
            };

            for document in page.documents {
                notes.push(document.try_into()?);
            }

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!("Fetched {} notes for {}", notes.len(), scope.user_id);
        Ok(notes)
    }

    async fn create(&self, scope: &UserScope, content: &str) -> StoreResult<Note> {
        let request = self
            .client
            .post(self.collection_url(scope))
            .json(&document_body(content));
        let document = Self::send(request, scope)
            .await?
            .json::<FirestoreDocument>()
            .await?;
        document.try_into()
    }

    async fn update(&self, scope: &UserScope, id: &NoteId, content: &str) -> StoreResult<()> {
        // `currentDocument.exists` keeps a late write from resurrecting a deleted note.
        let request = self
            .client
            .patch(self.document_url(scope, id))
            .query(&[
                ("updateMask.fieldPaths", CONTENT_FIELD),
                ("currentDocument.exists", "true"),
            ])
            .json(&document_body(content));
        Self::send(request, scope).await?;
        Ok(())
    }

    async fn delete(&self, scope: &UserScope, id: &NoteId) -> StoreResult<()> {
        let request = self.client.delete(self.document_url(scope, id));
        Self::send(request, scope).await?;
        Ok(())
    }
}

fn document_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "fields": {
            CONTENT_FIELD: { "stringValue": content },
        },
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: DocumentFields,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentFields {
    content: Option<FieldValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldValue {
    string_value: Option<String>,
}

impl TryFrom<FirestoreDocument> for Note {
    type Error = StoreError;

    fn try_from(value: FirestoreDocument) -> StoreResult<Self> {
        let id = value
            .name
            .rsplit('/')
            .next()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                StoreError::InvalidPayload(format!("document name '{}' has no id", value.name))
            })?;
        let id = urlencoding::decode(id)
            .map_err(|error| StoreError::InvalidPayload(error.to_string()))?
            .into_owned();

        let content = value
            .fields
            .content
            .and_then(|field| field.string_value)
            .unwrap_or_default();

        Ok(Self {
            id: NoteId::new(id),
            content,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FirestoreErrorResponse {
    error: Option<FirestoreErrorBody>,
}

#[derive(Debug, Deserialize)]
struct FirestoreErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(FirestoreErrorResponse { error: Some(error) }) =
        serde_json::from_str::<FirestoreErrorResponse>(body)
    {
        if let Some(message) = error.message.or(error.status) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
