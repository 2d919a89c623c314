//! Recompress large File Manager images and replace them in place
//!
//! The run has three steps: list every image through the v2 files endpoint
//! (offset pagination), recompress the ones above the size threshold into a
//! local directory and log them to JSON, then upload each logged file over
//! its original through the v3 `replace` endpoint. The log is the hand-off
//! between the last two steps, so either can be run on its own.

use crate::config::ImageSettings;
use crate::decode::JsonDecoder;
use crate::error::{Error, Result};
use crate::http::{HttpClient, MultipartUpload};
use crate::pagination::{FetchRequest, OffsetPaginator, PaginatedFetcher};
use crate::types::ItemErrorPolicy;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const JOB: &str = "images";

/// Legacy listing endpoint, the only one that filters by file type
pub const FILES_PATH: &str = "/filemanager/api/v2/files";

/// Replacement endpoint for one file
pub fn replace_path(file_id: &str) -> String {
    format!("/filemanager/api/v3/files/{file_id}/replace")
}

/// Which steps of the run to execute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageSteps {
    /// List, recompress and replace
    #[default]
    All,
    /// Stop after writing the log
    CompressOnly,
    /// Replace the files named in an existing log
    ReplaceOnly,
}

/// One entry of the compression log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedImage {
    pub id: String,
    pub path: PathBuf,
    pub original_size: u64,
    pub compressed_size: u64,
}

/// Summary of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageReport {
    pub listed: usize,
    /// Images above the size threshold
    pub candidates: usize,
    pub compressed: usize,
    /// Unsupported format, or recompression did not shrink the file
    pub skipped: usize,
    pub replaced: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ImageFile {
    id: String,
    url: String,
    size: u64,
}

impl ImageFile {
    fn from_record(record: &Value) -> Option<Self> {
        let id = match record.get("id")? {
            Value::Number(n) => n.to_string(),
            Value::String(s) if !s.is_empty() => s.clone(),
            _ => return None,
        };
        Some(Self {
            id,
            url: record.get("url")?.as_str()?.to_string(),
            size: record.get("size").and_then(Value::as_u64).unwrap_or(0),
        })
    }
}

/// Every image in the File Manager
pub async fn list_images(client: &HttpClient, settings: &ImageSettings) -> Result<Vec<Value>> {
    let fetcher = PaginatedFetcher::new(client.clone())
        .with_paginator(OffsetPaginator::new("offset", "limit", settings.page_size))
        .with_decoder(JsonDecoder::with_path("objects"));

    fetcher
        .collect_records(FetchRequest::get(FILES_PATH).param("type", "IMG"))
        .await
}

/// Re-encode an image in its own format.
///
/// JPEGs are written at `jpeg_quality` without alpha, PNGs with the
/// strongest lossless compression. Returns `None` for any other format.
pub fn recompress(bytes: &[u8], jpeg_quality: u8) -> Result<Option<(Vec<u8>, &'static str)>> {
    let Ok(format) = image::guess_format(bytes) else {
        return Ok(None);
    };
    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
        return Ok(None);
    }

    let img = image::load_from_memory_with_format(bytes, format)?;
    let mut out = Vec::new();
    let extension = match format {
        ImageFormat::Jpeg => {
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut out, jpeg_quality).encode_image(&rgb)?;
            "jpeg"
        }
        _ => {
            let encoder =
                PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
            img.write_with_encoder(encoder)?;
            "png"
        }
    };
    Ok(Some((out, extension)))
}

async fn compress_one(
    downloader: &HttpClient,
    file: &ImageFile,
    settings: &ImageSettings,
) -> Result<Option<CompressedImage>> {
    let original = downloader.get_bytes(&file.url).await?;
    let original_size = original.len() as u64;
    let quality = settings.jpeg_quality;

    let encoded = tokio::task::spawn_blocking(move || recompress(&original, quality))
        .await
        .map_err(|e| Error::job(JOB, format!("recompression of {} panicked: {e}", file.id)))??;

    let Some((data, extension)) = encoded else {
        info!("Image {} is not a JPEG or PNG, skipping", file.id);
        return Ok(None);
    };
    if data.len() as u64 >= original_size {
        debug!(
            "Image {} did not shrink ({} -> {} bytes)",
            file.id,
            original_size,
            data.len()
        );
        return Ok(None);
    }

    let path = settings.output_dir.join(format!("{}.{extension}", file.id));
    fs::write(&path, &data)?;
    info!(
        "Compressed image {}: {} -> {} bytes",
        file.id,
        original_size,
        data.len()
    );

    Ok(Some(CompressedImage {
        id: file.id.clone(),
        path,
        original_size,
        compressed_size: data.len() as u64,
    }))
}

/// Recompress every listed image above the threshold and write the log
pub async fn compress_images(
    downloader: &HttpClient,
    images: &[Value],
    settings: &ImageSettings,
    policy: ItemErrorPolicy,
    report: &mut ImageReport,
) -> Result<Vec<CompressedImage>> {
    fs::create_dir_all(&settings.output_dir)?;
    let candidates: Vec<ImageFile> = images
        .iter()
        .filter_map(ImageFile::from_record)
        .filter(|file| file.size > settings.min_size_bytes)
        .collect();
    report.candidates = candidates.len();
    info!(
        "{} of {} images are larger than {} bytes",
        candidates.len(),
        images.len(),
        settings.min_size_bytes
    );

    let mut compressed = Vec::new();
    for (idx, file) in candidates.iter().enumerate() {
        if idx > 0 && settings.pause_ms > 0 {
            tokio::time::sleep(Duration::from_millis(settings.pause_ms)).await;
        }
        match compress_one(downloader, file, settings).await {
            Ok(Some(entry)) => compressed.push(entry),
            Ok(None) => report.skipped += 1,
            Err(e) if policy == ItemErrorPolicy::Skip => {
                warn!("Error processing image {}: {e}", file.id);
                report.failed += 1;
            }
            Err(e) => return Err(e),
        }
    }
    report.compressed = compressed.len();

    write_json(&settings.log_path, &compressed)?;
    Ok(compressed)
}

/// Upload each logged file over its original
pub async fn replace_images(
    client: &HttpClient,
    compressed: &[CompressedImage],
    settings: &ImageSettings,
    policy: ItemErrorPolicy,
    report: &mut ImageReport,
) -> Result<()> {
    let options = json!({ "access": settings.access });

    for entry in compressed {
        let file_name = entry
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry.id.clone());
        let data = fs::read(&entry.path)?;
        let upload = MultipartUpload::new()
            .json("options", &options)
            .file("file", file_name, "application/octet-stream", data);

        match client.send_multipart(&replace_path(&entry.id), &upload).await {
            Ok(_) => {
                info!("Replaced file {}", entry.id);
                report.replaced += 1;
            }
            Err(e) if policy == ItemErrorPolicy::Skip => {
                warn!("Failed to replace file {}: {e}", entry.id);
                report.failed += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Read a log written by [`compress_images`]
pub fn read_log(path: &Path) -> Result<Vec<CompressedImage>> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound {
            path: path.display().to_string(),
        },
        _ => Error::Io(e),
    })?;
    Ok(serde_json::from_str(&text)?)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Run the requested steps
pub async fn compress_and_replace(
    client: &HttpClient,
    downloader: &HttpClient,
    settings: &ImageSettings,
    policy: ItemErrorPolicy,
    steps: ImageSteps,
) -> Result<ImageReport> {
    let mut report = ImageReport::default();

    let compressed = if steps == ImageSteps::ReplaceOnly {
        let logged = read_log(&settings.log_path)?;
        info!(
            "Replacing {} files from {}",
            logged.len(),
            settings.log_path.display()
        );
        logged
    } else {
        let images = list_images(client, settings).await?;
        report.listed = images.len();
        write_json(&settings.listing_path, &images)?;
        info!(
            "Listed {} images into {}",
            images.len(),
            settings.listing_path.display()
        );
        compress_images(downloader, &images, settings, policy, &mut report).await?
    };

    if steps != ImageSteps::CompressOnly {
        replace_images(client, &compressed, settings, policy, &mut report).await?;
    }

    info!(
        "Images done: {} compressed, {} replaced, {} failed",
        report.compressed, report.replaced, report.failed
    );
    Ok(report)
}
