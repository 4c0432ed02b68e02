use crate::error::{ClientError, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};

fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.header("Authorization", format!("Bearer {}", token)),
        None => request,
    }
}

async fn check(response: Response) -> Result<Response> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Remote { status, body });
    }
    Ok(response)
}

pub async fn get<T: DeserializeOwned>(client: &Client, url: &str, token: Option<&str>) -> Result<T> {
    let response = authorize(client.get(url), token).send().await?;
    Ok(check(response).await?.json().await?)
}

pub async fn post<T: DeserializeOwned, B: Serialize>(
    client: &Client,
    url: &str,
    body: &B,
    token: Option<&str>,
) -> Result<T> {
    let response = authorize(client.post(url).json(body), token).send().await?;
    Ok(check(response).await?.json().await?)
}

pub async fn post_multipart<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    form: reqwest::multipart::Form,
) -> Result<T> {
    let response = client.post(url).multipart(form).send().await?;
    Ok(check(response).await?.json().await?)
}

/// Succeeds on any 2xx answer, ignoring the body
pub async fn check_health(client: &Client, url: &str) -> Result<()> {
    let response = client.get(url).send().await?;
    check(response).await?;
    Ok(())
}
