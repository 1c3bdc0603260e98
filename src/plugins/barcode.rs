// SPDX-License-Identifier: GPL-3.0-only

//! Barcode scanning plugin
//!
//! [`BarcodeScanner`] publishes the barcodes found in the most recent
//! analyzed frame. The detector is pluggable; the default is the bundled
//! [`QrDetector`].

use super::fanout::{AnalyzeFn, FrameAnalyzer};
use super::{CameraPlugin, DetectionStream, DetectorError, QrDetector};
use crate::backends::camera::{CameraFrame, FrameRegion};
use crate::controller::CameraController;
use std::collections::HashSet;
use std::sync::Arc;

/// Plugin id of [`BarcodeScanner`]
pub const BARCODE_SCANNER_ID: &str = "BarcodeScanner";

/// Barcode symbology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarcodeFormat {
    QrCode,
    Aztec,
    DataMatrix,
    Pdf417,
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    Code39,
    Code93,
    Code128,
    Codabar,
    Itf,
    Unknown,
}

impl BarcodeFormat {
    pub fn is_2d(&self) -> bool {
        matches!(
            self,
            BarcodeFormat::QrCode
                | BarcodeFormat::Aztec
                | BarcodeFormat::DataMatrix
                | BarcodeFormat::Pdf417
        )
    }
}

/// One decoded barcode
#[derive(Debug, Clone, PartialEq)]
pub struct Barcode {
    /// Payload exactly as decoded
    pub raw_value: String,
    pub format: BarcodeFormat,
    /// Human-friendly rendering, when the detector offers one
    pub display_value: Option<String>,
    /// Location in normalized frame coordinates
    pub bounds: Option<FrameRegion>,
}

impl Barcode {
    pub fn new(raw_value: impl Into<String>, format: BarcodeFormat) -> Self {
        Self {
            raw_value: raw_value.into(),
            format,
            display_value: None,
            bounds: None,
        }
    }

    pub fn with_bounds(mut self, bounds: FrameRegion) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_display_value(mut self, display_value: impl Into<String>) -> Self {
        self.display_value = Some(display_value.into());
        self
    }

    /// Classify the payload
    pub fn value(&self) -> BarcodeValue {
        BarcodeValue::parse(&self.raw_value)
    }
}

/// Decodes barcodes from a single frame
///
/// Called on the blocking pool, at most once at a time per scanner.
pub trait BarcodeDetector: Send + Sync {
    fn detect(&self, frame: &CameraFrame) -> Result<Vec<Barcode>, DetectorError>;
}

impl<F> BarcodeDetector for F
where
    F: Fn(&CameraFrame) -> Result<Vec<Barcode>, DetectorError> + Send + Sync,
{
    fn detect(&self, frame: &CameraFrame) -> Result<Vec<Barcode>, DetectorError> {
        self(frame)
    }
}

/// Plugin publishing the barcodes of the latest analyzed frame
pub struct BarcodeScanner {
    analyzer: FrameAnalyzer<Vec<Barcode>>,
}

impl Default for BarcodeScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl BarcodeScanner {
    /// Scanner using the bundled QR detector
    pub fn new() -> Self {
        Self::with_detector(Arc::new(QrDetector::new()))
    }

    pub fn with_detector(detector: Arc<dyn BarcodeDetector>) -> Self {
        Self::build(detector, None)
    }

    /// Only publish barcodes of the given formats
    pub fn with_detector_and_formats(
        detector: Arc<dyn BarcodeDetector>,
        formats: impl IntoIterator<Item = BarcodeFormat>,
    ) -> Self {
        Self::build(detector, Some(formats.into_iter().collect()))
    }

    fn build(detector: Arc<dyn BarcodeDetector>, formats: Option<HashSet<BarcodeFormat>>) -> Self {
        let analyze: Arc<AnalyzeFn<Vec<Barcode>>> =
            Arc::new(move |frame: &CameraFrame| -> Result<_, DetectorError> {
                let mut barcodes = detector.detect(frame)?;
                if let Some(formats) = &formats {
                    barcodes.retain(|b| formats.contains(&b.format));
                }
                Ok(barcodes)
            });
        Self {
            analyzer: FrameAnalyzer::new(BARCODE_SCANNER_ID, Vec::new(), analyze),
        }
    }

    /// Latest-value stream of detected barcodes
    pub fn barcodes(&self) -> DetectionStream<Vec<Barcode>> {
        self.analyzer.stream()
    }

    pub fn current(&self) -> Vec<Barcode> {
        self.analyzer.current()
    }

    pub fn frames_dropped(&self) -> u64 {
        self.analyzer.frames_dropped()
    }

    pub fn frames_analyzed(&self) -> u64 {
        self.analyzer.frames_analyzed()
    }

    pub fn is_attached(&self) -> bool {
        self.analyzer.is_attached()
    }
}

impl CameraPlugin for BarcodeScanner {
    fn id(&self) -> &str {
        BARCODE_SCANNER_ID
    }

    fn on_attach(&self, controller: &dyn CameraController) {
        self.analyzer.attach(controller);
    }

    fn on_detach(&self) {
        self.analyzer.detach();
    }
}

/// WiFi security type parsed from a barcode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiSecurity {
    /// No security (open network)
    None,
    /// WEP security (legacy, insecure)
    Wep,
    /// WPA/WPA2 Personal
    Wpa,
    /// WPA2/WPA3 Enterprise
    Enterprise,
    /// WPA3
    Wpa3,
}

impl WifiSecurity {
    fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "WEP" => Self::Wep,
            "WPA" | "WPA2" => Self::Wpa,
            "WPA2-EAP" | "WPA3-EAP" => Self::Enterprise,
            "WPA3" | "SAE" => Self::Wpa3,
            "NOPASS" | "" => Self::None,
            // Unknown tokens are most likely a WPA variant
            _ => Self::Wpa,
        }
    }
}

/// Structured meaning of a barcode payload
#[derive(Debug, Clone, PartialEq)]
pub enum BarcodeValue {
    Url(String),
    Wifi {
        ssid: String,
        password: Option<String>,
        security: WifiSecurity,
        hidden: bool,
    },
    Phone(String),
    Email {
        address: String,
        subject: Option<String>,
        body: Option<String>,
    },
    Sms {
        number: String,
        message: Option<String>,
    },
    Geo {
        latitude: f64,
        longitude: f64,
        label: Option<String>,
    },
    /// vCard payload
    Contact(String),
    /// iCalendar payload
    Event(String),
    Text(String),
}

impl BarcodeValue {
    /// Classify `content`; anything unrecognized is `Text`
    pub fn parse(content: &str) -> Self {
        let trimmed = content.trim();

        if trimmed.starts_with("WIFI:") {
            return Self::parse_wifi(trimmed);
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Self::Url(trimmed.to_string());
        }
        if let Some(number) = strip_prefix_ci(trimmed, "tel:") {
            return Self::Phone(number.to_string());
        }
        if let Some(rest) = strip_prefix_ci(trimmed, "mailto:") {
            return Self::parse_mailto(rest);
        }
        if let Some(rest) =
            strip_prefix_ci(trimmed, "smsto:").or_else(|| strip_prefix_ci(trimmed, "sms:"))
        {
            return Self::parse_sms(rest);
        }
        if let Some(rest) = strip_prefix_ci(trimmed, "geo:")
            && let Some(geo) = Self::parse_geo(rest)
        {
            return geo;
        }
        if trimmed.starts_with("BEGIN:VCARD") {
            return Self::Contact(trimmed.to_string());
        }
        if trimmed.starts_with("BEGIN:VCALENDAR") || trimmed.starts_with("BEGIN:VEVENT") {
            return Self::Event(trimmed.to_string());
        }

        Self::Text(trimmed.to_string())
    }

    /// `WIFI:T:WPA;S:network;P:password;H:true;;`
    fn parse_wifi(content: &str) -> Self {
        let mut ssid = String::new();
        let mut password = None;
        let mut security = WifiSecurity::None;
        let mut hidden = false;

        let body = content.strip_prefix("WIFI:").unwrap_or(content);
        for field in split_unescaped(body, ';') {
            let Some((key, value)) = field.split_once(':') else {
                continue;
            };
            let value = unescape_wifi(value);
            match key {
                "S" => ssid = value,
                "P" if !value.is_empty() => password = Some(value),
                "T" => security = WifiSecurity::parse(&value),
                "H" => hidden = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        Self::Wifi {
            ssid,
            password,
            security,
            hidden,
        }
    }

    fn parse_mailto(content: &str) -> Self {
        let (address, params) = content.split_once('?').unwrap_or((content, ""));
        let mut subject = None;
        let mut body = None;
        for (key, value) in query_pairs(params) {
            match key.to_ascii_lowercase().as_str() {
                "subject" => subject = Some(value),
                "body" => body = Some(value),
                _ => {}
            }
        }
        Self::Email {
            address: address.to_string(),
            subject,
            body,
        }
    }

    /// Accepts both `sms:number?body=text` and `SMSTO:number:text`
    fn parse_sms(content: &str) -> Self {
        if let Some((number, params)) = content.split_once('?') {
            let message = query_pairs(params)
                .find(|(key, _)| key.eq_ignore_ascii_case("body"))
                .map(|(_, value)| value);
            return Self::Sms {
                number: number.to_string(),
                message,
            };
        }
        match content.split_once(':') {
            Some((number, message)) => Self::Sms {
                number: number.to_string(),
                message: (!message.is_empty()).then(|| message.to_string()),
            },
            None => Self::Sms {
                number: content.to_string(),
                message: None,
            },
        }
    }

    fn parse_geo(content: &str) -> Option<Self> {
        let (coords, params) = content.split_once('?').unwrap_or((content, ""));
        let mut parts = coords.split(',');
        let latitude = parts.next()?.trim().parse::<f64>().ok()?;
        let longitude = parts.next()?.trim().parse::<f64>().ok()?;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        let label = query_pairs(params)
            .find(|(key, _)| key == "q" || key == "label")
            .map(|(_, value)| value);
        Some(Self::Geo {
            latitude,
            longitude,
            label,
        })
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

/// Split on `sep` unless preceded by a backslash
fn split_unescaped(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            c if c == sep && !escaped => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => escaped = false,
        }
    }
    parts.push(&s[start..]);
    parts.retain(|p| !p.is_empty());
    parts
}

fn unescape_wifi(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn query_pairs(params: &str) -> impl Iterator<Item = (String, String)> + '_ {
    params.split('&').filter_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        Some((key.to_string(), percent_decode(value)))
    })
}

/// Decode `%XX` escapes and `+` as space; invalid UTF-8 is replaced
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                        continue;
                    }
                    None => out.push(b'%'),
                }
            }
            b'+' => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_and_text() {
        assert_eq!(
            BarcodeValue::parse("https://example.com/path"),
            BarcodeValue::Url("https://example.com/path".to_string())
        );
        assert_eq!(
            BarcodeValue::parse("ABC123"),
            BarcodeValue::Text("ABC123".to_string())
        );
    }

    #[test]
    fn test_parse_wifi_with_escapes() {
        let value = BarcodeValue::parse(r"WIFI:T:WPA;S:My\;Net;P:pa\:ss;H:true;;");
        assert_eq!(
            value,
            BarcodeValue::Wifi {
                ssid: "My;Net".to_string(),
                password: Some("pa:ss".to_string()),
                security: WifiSecurity::Wpa,
                hidden: true,
            }
        );
    }

    #[test]
    fn test_parse_mailto_and_sms() {
        assert_eq!(
            BarcodeValue::parse("mailto:a@b.c?subject=Hi%20there&body=x+y"),
            BarcodeValue::Email {
                address: "a@b.c".to_string(),
                subject: Some("Hi there".to_string()),
                body: Some("x y".to_string()),
            }
        );
        assert_eq!(
            BarcodeValue::parse("SMSTO:+123:hello"),
            BarcodeValue::Sms {
                number: "+123".to_string(),
                message: Some("hello".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_geo() {
        assert_eq!(
            BarcodeValue::parse("geo:52.1,4.3?q=Caf%C3%A9"),
            BarcodeValue::Geo {
                latitude: 52.1,
                longitude: 4.3,
                label: Some("Café".to_string()),
            }
        );
        assert!(matches!(
            BarcodeValue::parse("geo:200,4"),
            BarcodeValue::Text(_)
        ));
    }

    #[test]
    fn test_percent_decode_edge_cases() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("%41"), "A");
    }
}
