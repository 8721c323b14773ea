//! NexusPHP transport
//!
//! NexusPHP is the framework behind most of the supported sites: torrents
//! come from `download.php`, uploads go to `takeupload.php`.

use async_trait::async_trait;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::details::{self, SourceDetails};
use super::transport::{SourceTorrent, TorrentSource, UploadOutcome, UploadPayload, Uploader};
use super::{Result, SiteConfig, SiteError};

const USER_AGENT: &str = concat!("transplant/", env!("CARGO_PKG_VERSION"));

static EXISTED_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"url=([^&\s]+/details\.php\?id=\d+[^&\s]*)").unwrap());

pub struct NexusPhpClient {
    http: reqwest::Client,
}

impl NexusPhpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http })
    }

    async fn submit(&self, site: &SiteConfig, payload: &UploadPayload) -> Result<UploadOutcome> {
        let cookie = match site.cookie.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => return Ok(UploadOutcome::failure(format!("Cookie for {} is not configured", site.name))),
        };

        let bytes = tokio::fs::read(&payload.torrent_path)
            .await
            .map_err(|e| SiteError::InvalidResponse(format!("Cannot read {}: {}", payload.torrent_path.display(), e)))?;
        let file_name = payload
            .torrent_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.torrent".to_string());

        let mut form = Form::new()
            .text("name", payload.name.clone())
            .text("small_descr", payload.subtitle.clone())
            .text("url", payload.imdb_link.clone())
            .text("descr", payload.description.clone())
            .text("technical_info", payload.mediainfo.clone())
            .text("uplver", "no");
        for (field, value) in &payload.fields {
            form = form.text(field.clone(), value.clone());
        }
        let torrent = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/x-bittorrent")?;
        form = form
            .part("file", torrent)
            .part("nfo", Part::bytes(Vec::new()).file_name(""));

        let base = site.base_url.trim_end_matches('/');
        let origin = site.origin()?;
        info!("Submitting '{}' to {}", payload.name, site.name);
        let response = self
            .http
            .post(format!("{}/takeupload.php", base))
            .header("Cookie", cookie)
            .header("Origin", origin)
            .header("Referer", format!("{}/upload.php", base))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok(interpret_upload_response(&final_url, &body))
    }
}

/// Classify the page the upload form redirected to.
pub fn interpret_upload_response(final_url: &str, body: &str) -> UploadOutcome {
    let url = final_url.to_lowercase();

    if url.contains("details.php") && url.contains("uploaded=1") {
        return UploadOutcome::success(format!("Uploaded: {}", url));
    }
    if url.contains("details.php") && url.contains("existed=1") {
        return UploadOutcome::success(format!("Torrent already exists: {}", url));
    }
    if body.contains("该种子已存在") {
        return match EXISTED_URL_RE.captures(body).and_then(|c| c.get(1)) {
            Some(m) => {
                let found = m.as_str();
                let link = if found.starts_with("http://") || found.starts_with("https://") {
                    found.to_string()
                } else {
                    format!("https://{}", found)
                };
                UploadOutcome::success(format!("Torrent already exists: {}", link))
            }
            None => UploadOutcome::success("Torrent already exists"),
        };
    }
    if url.contains("login.php") {
        return UploadOutcome::failure("Cookie expired or invalid (redirected to login)");
    }

    debug!("Unexpected upload response body: {}", body);
    let text = details::page_message(body);
    if text.is_empty() {
        UploadOutcome::failure(format!("Upload rejected, check the site response at {}", url))
    } else {
        UploadOutcome::failure(format!("Upload rejected at {}: {}", url, text))
    }
}

/// Pull the file name out of a Content-Disposition header.
pub fn disposition_filename(header: &str) -> Option<String> {
    for part in header.split(';').map(str::trim) {
        if let Some(encoded) = part.strip_prefix("filename*=") {
            let value = encoded.rsplit("''").next().unwrap_or(encoded);
            if let Ok(decoded) = urlencoding::decode(value.trim_matches('"')) {
                return Some(decoded.into_owned());
            }
        }
    }
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|v| v.trim_matches('"'))
        .filter(|v| !v.is_empty())
        .map(|v| {
            urlencoding::decode(v)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| v.to_string())
        })
}

#[async_trait]
impl TorrentSource for NexusPhpClient {
    async fn download(&self, site: &SiteConfig, torrent_id: &str) -> Result<SourceTorrent> {
        let url = site.build_download_url(torrent_id)?;

        let mut request = self.http.get(&url);
        if let Some(ref cookie) = site.cookie {
            request = request.header("Cookie", cookie);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(SiteError::DownloadFailed(format!(
                "HTTP {}: {}",
                response.status(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let filename = response
            .headers()
            .get("content-disposition")
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename);

        if content_type.contains("text/html") {
            let text = response.text().await?;
            if text.contains("login") || text.contains("登录") {
                return Err(SiteError::MissingCookie(site.id.clone()));
            }
            return Err(SiteError::InvalidResponse(
                "Received HTML instead of torrent file".to_string(),
            ));
        }

        let bytes = response.bytes().await?;
        if bytes.first() != Some(&b'd') {
            return Err(SiteError::InvalidResponse(
                "Invalid torrent file format".to_string(),
            ));
        }

        debug!("Downloaded {} bytes from {}", bytes.len(), site.name);
        Ok(SourceTorrent {
            filename,
            bytes: bytes.to_vec(),
        })
    }

    async fn details(&self, site: &SiteConfig, torrent_id: &str) -> Result<SourceDetails> {
        let cookie = site
            .cookie
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| SiteError::MissingCookie(site.id.clone()))?;

        let url = site.build_details_url(torrent_id);
        let response = self.http.get(&url).header("Cookie", cookie).send().await?;
        if !response.status().is_success() {
            return Err(SiteError::DownloadFailed(format!(
                "HTTP {} for {}",
                response.status(),
                url
            )));
        }
        if response.url().path().contains("login.php") {
            return Err(SiteError::MissingCookie(site.id.clone()));
        }

        let html = response.text().await?;
        let details = details::parse_details(&html);
        if details.is_empty() {
            return Err(SiteError::InvalidResponse(format!(
                "No listing found at {}: {}",
                url,
                details::page_message(&html)
            )));
        }
        debug!("Read listing {} from {}: {}", torrent_id, site.name, details.title);
        Ok(details)
    }
}

#[async_trait]
impl Uploader for NexusPhpClient {
    async fn upload(&self, site: &SiteConfig, payload: &UploadPayload) -> UploadOutcome {
        match self.submit(site, payload).await {
            Ok(outcome) => {
                if !outcome.success {
                    warn!("Upload to {} failed: {}", site.name, outcome.message);
                }
                outcome
            }
            Err(e) => {
                error!("Upload to {} errored: {}", site.name, e);
                UploadOutcome::failure(format!("Request failed: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_success() {
        let outcome = interpret_upload_response("https://hdsky.me/details.php?id=1&uploaded=1", "");
        assert!(outcome.success);
        assert!(outcome.message.contains("details.php?id=1"));
    }

    #[test]
    fn test_upload_existed() {
        let outcome = interpret_upload_response("https://a.b/details.php?id=9&existed=1", "");
        assert!(outcome.success);

        let body = "<meta http-equiv=\"refresh\" content=\"3; url=a.b/details.php?id=77\">该种子已存在";
        let outcome = interpret_upload_response("https://a.b/takeupload.php", body);
        assert!(outcome.success);
        assert!(outcome.message.contains("https://a.b/details.php?id=77"), "{}", outcome.message);
    }

    #[test]
    fn test_upload_login_redirect() {
        let outcome = interpret_upload_response("https://a.b/login.php?returnto=upload.php", "");
        assert!(!outcome.success);
        assert!(outcome.message.contains("Cookie"));
    }

    #[test]
    fn test_upload_unknown_page() {
        let outcome = interpret_upload_response("https://a.b/takeupload.php", "<html>标题太短</html>");
        assert!(!outcome.success);
        assert!(outcome.message.contains("标题太短"), "{}", outcome.message);

        let body = "<html><body><h2>上传失败！</h2><table><tr>\
                    <td class=\"text\">缺少种子文件</td></tr></table></body></html>";
        let outcome = interpret_upload_response("https://a.b/takeupload.php", body);
        assert_eq!(outcome.message, "Upload rejected at https://a.b/takeupload.php: 缺少种子文件");

        let outcome = interpret_upload_response("https://a.b/takeupload.php", "");
        assert!(outcome.message.contains("check the site response"));
    }

    #[tokio::test]
    async fn test_details_without_cookie() {
        let client = NexusPhpClient::new(Duration::from_secs(1)).unwrap();
        let site = crate::site::builtin_sites().remove(0);
        let err = client.details(&site, "1").await.unwrap_err();
        assert!(matches!(err, SiteError::MissingCookie(_)));
    }

    #[test]
    fn test_disposition_filename() {
        assert_eq!(
            disposition_filename("attachment; filename=\"%5BHDSky%5D.Movie.torrent\"").as_deref(),
            Some("[HDSky].Movie.torrent")
        );
        assert_eq!(
            disposition_filename("attachment; filename*=UTF-8''%E7%94%B5%E5%BD%B1.torrent").as_deref(),
            Some("电影.torrent")
        );
        assert_eq!(disposition_filename("inline"), None);
    }

    #[tokio::test]
    async fn test_upload_without_cookie_is_outcome() {
        let client = NexusPhpClient::new(Duration::from_secs(1)).unwrap();
        let site = crate::site::builtin_sites().remove(0);
        let outcome = client.upload(&site, &UploadPayload::default()).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("Cookie"));
    }
}
