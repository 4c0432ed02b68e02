use super::{api, MediaHost, MessageStore};
use crate::error::{ClientError, Result};
use crate::image;
use async_trait::async_trait;
use hearth_protocol::{ImageData, MessageData, OutgoingMessage, UploadSignature, UploadedAsset};
use reqwest::{multipart, Client};

/// Message store reached over its REST API
#[derive(Clone)]
pub struct HttpMessageStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpMessageStore {
    pub fn new(client: Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn messages_url(&self, room_id: &str) -> String {
        format!(
            "{}/api/rooms/{}/messages",
            self.base_url,
            urlencoding::encode(room_id)
        )
    }
}

#[async_trait]
impl MessageStore for HttpMessageStore {
    async fn create_message(&self, room_id: &str, message: &OutgoingMessage) -> Result<MessageData> {
        api::post(
            &self.client,
            &self.messages_url(room_id),
            message,
            self.token.as_deref(),
        )
        .await
    }

    async fn list_messages(&self, room_id: &str) -> Result<Vec<MessageData>> {
        let mut messages: Vec<MessageData> =
            api::get(&self.client, &self.messages_url(room_id), self.token.as_deref()).await?;
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }
}

/// Media host that accepts uploads signed by a separate signing service
#[derive(Clone)]
pub struct SignedMediaHost {
    client: Client,
    signing_url: String,
    upload_url: String,
    folder: String,
    token: Option<String>,
}

impl SignedMediaHost {
    pub fn new(
        client: Client,
        signing_url: &str,
        upload_url: &str,
        folder: &str,
        token: Option<String>,
    ) -> Self {
        Self {
            client,
            signing_url: signing_url.to_string(),
            upload_url: upload_url.to_string(),
            folder: folder.to_string(),
            token,
        }
    }

    async fn signature(&self) -> Result<UploadSignature> {
        #[derive(serde::Serialize)]
        struct SignatureRequest<'a> {
            folder: &'a str,
        }

        api::post(
            &self.client,
            &self.signing_url,
            &SignatureRequest { folder: &self.folder },
            self.token.as_deref(),
        )
        .await
    }
}

#[async_trait]
impl MediaHost for SignedMediaHost {
    async fn upload_image(&self, image: &ImageData) -> Result<String> {
        let bytes = image::decode(image)?;
        let signature = self.signature().await?;

        let file = multipart::Part::bytes(bytes)
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type)
            .map_err(|e| ClientError::InvalidImage(format!("Bad mime type '{}': {}", image.mime_type, e)))?;

        let form = multipart::Form::new()
            .part("file", file)
            .text("api_key", signature.api_key)
            .text("timestamp", signature.timestamp.to_string())
            .text("signature", signature.signature)
            .text("folder", signature.folder);

        let asset: UploadedAsset = api::post_multipart(&self.client, &self.upload_url, form)
            .await
            .map_err(|e| match e {
                ClientError::Remote { status, body } => {
                    ClientError::Upload(format!("media host answered {}: {}", status, body))
                }
                other => other,
            })?;

        tracing::debug!("Uploaded {} to {}", image.file_name, asset.secure_url);
        Ok(asset.secure_url)
    }
}
