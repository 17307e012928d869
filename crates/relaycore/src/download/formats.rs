use serde::Serialize;
use serde_json::Value;

use crate::core::config::Config;
use crate::core::process::ProcessGateway;
use crate::download::args::discovery_args;
use crate::download::error::JobError;

/// One encoding offered by the remote item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    pub ext: String,
    pub has_video: bool,
    pub has_audio: bool,
    /// Human label, e.g. "medium" or "128kbps"
    pub quality: String,
    /// Exact or approximate size in bytes, when the extractor knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
    /// Average audio bitrate in kbit/s
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abr: Option<f64>,
}

impl FormatDescriptor {
    /// Audio-only: no video codec and an audio codec present.
    pub fn is_audio_only(&self) -> bool {
        !self.has_video && self.has_audio
    }
}

/// yt-dlp reports a missing stream as the literal codec name "none"; an absent
/// field is treated the same way.
fn codec_present(format: &Value, field: &str) -> bool {
    match format.get(field).and_then(|v| v.as_str()) {
        Some(codec) => !codec.is_empty() && codec != "none",
        None => false,
    }
}

fn quality_label(format: &Value, abr: Option<f64>) -> String {
    if let Some(note) = format
        .get("format_note")
        .and_then(|v| v.as_str())
        .filter(|note| !note.is_empty())
    {
        return note.to_string();
    }
    if let Some(abr) = abr {
        return format!("{}kbps", abr.round() as u64);
    }
    format
        .get("resolution")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}

fn descriptor_from_json(format: &Value) -> Option<FormatDescriptor> {
    let format_id = match format.get("format_id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return None,
    };

    let abr = format.get("abr").and_then(|v| v.as_f64());
    let filesize = format
        .get("filesize")
        .and_then(|v| v.as_u64())
        .or_else(|| format.get("filesize_approx").and_then(|v| v.as_u64()));

    Some(FormatDescriptor {
        format_id,
        ext: format.get("ext").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        has_video: codec_present(format, "vcodec"),
        has_audio: codec_present(format, "acodec"),
        quality: quality_label(format, abr),
        filesize,
        abr,
    })
}

/// Parses a `-J` information dump into descriptors.
///
/// A document without a `formats` array is rejected; individual entries
/// without a `format_id` are skipped.
pub fn parse_formats(json: &str) -> Result<Vec<FormatDescriptor>, JobError> {
    let document: Value = serde_json::from_str(json).map_err(|e| JobError::Parse(e.to_string()))?;

    let formats = document
        .get("formats")
        .and_then(|v| v.as_array())
        .ok_or_else(|| JobError::Parse("missing formats array".to_string()))?;

    Ok(formats.iter().filter_map(descriptor_from_json).collect())
}

/// Narrows a descriptor list to audio-only entries, keeping order.
pub fn audio_only(formats: &[FormatDescriptor]) -> Vec<FormatDescriptor> {
    formats.iter().filter(|f| f.is_audio_only()).cloned().collect()
}

/// Runs one bounded discovery against `url` and returns every descriptor.
///
/// The URL is handed to yt-dlp as is. A non-zero exit is only fatal when it
/// also leaves stdout unparseable.
pub async fn discover(gateway: &dyn ProcessGateway, config: &Config, url: &str) -> Result<Vec<FormatDescriptor>, JobError> {
    let args = discovery_args(config, url);
    let output = gateway.run_once(&config.ytdlp_bin, &args, config.discovery_timeout).await?;

    if output.exit_code != Some(0) {
        let stderr = output.stderr.trim();
        if !stderr.is_empty() {
            log::warn!("Discovery for {} exited with {:?}: {}", url, output.exit_code, stderr);
        }
    }

    let formats = parse_formats(&output.stdout)?;
    log::debug!("Discovered {} formats for {}", formats.len(), url);
    Ok(formats)
}

/// Discovery narrowed to audio-only formats.
pub async fn discover_audio_formats(
    gateway: &dyn ProcessGateway,
    config: &Config,
    url: &str,
) -> Result<Vec<FormatDescriptor>, JobError> {
    let formats = discover(gateway, config, url).await?;
    Ok(audio_only(&formats))
}
