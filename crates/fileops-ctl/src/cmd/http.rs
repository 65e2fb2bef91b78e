//! Shared HTTP request helpers for the status API commands.

use anyhow::{Context, Result};
use serde::Deserialize;

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api", port)
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to fileopsd at {}, is it running?", url))?
        .error_for_status()?
        .json::<T>()
        .await
        .context("failed to parse response")
}

pub async fn post_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::Client::new()
        .post(url)
        .send()
        .await
        .with_context(|| format!("failed to connect to fileopsd at {}, is it running?", url))?
        .error_for_status()?
        .json::<T>()
        .await
        .context("failed to parse response")
}

pub async fn delete_json<T: for<'de> Deserialize<'de>>(url: &str, query: &[(&str, &str)]) -> Result<T> {
    let mut url = reqwest::Url::parse(url).with_context(|| format!("invalid URL {}", url))?;
    url.query_pairs_mut().extend_pairs(query);

    reqwest::Client::new()
        .delete(url.clone())
        .send()
        .await
        .with_context(|| format!("failed to connect to fileopsd at {}, is it running?", url))?
        .error_for_status()?
        .json::<T>()
        .await
        .context("failed to parse response")
}
