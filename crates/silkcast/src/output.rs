use std::io::{self, IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::{Map, Value};
use silkcast_client::{Image, PixelFormat};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line.
    Json,
    Table,
    /// One `key=value` line per event.
    Pretty,
    /// Frame bytes only, back to back.
    Raw,
}

impl OutputFormat {
    /// Tables for a terminal, JSON lines for pipes.
    pub fn detect() -> Self {
        if io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One delivered frame, as printed.
#[derive(Debug, Serialize)]
pub struct FrameRecord<'a> {
    pub event: &'static str,
    pub source: &'a str,
    pub sequence: u64,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub format: &'static str,
    pub timestamp: String,
    #[serde(skip)]
    pub data: &'a [u8],
}

impl<'a> FrameRecord<'a> {
    pub fn from_image(source: &'a str, sequence: u64, image: &'a Image) -> Self {
        let (width, height, format) = match image.format {
            PixelFormat::Rgb8 => (Some(image.width), Some(image.height), "rgb8"),
            PixelFormat::Compressed => (None, None, "compressed"),
        };
        Self {
            event: "frame",
            source,
            sequence,
            size: image.data.len(),
            width,
            height,
            format,
            timestamp: unix_seconds(SystemTime::now()),
            data: image.data.as_ref(),
        }
    }

    pub fn from_jpeg(source: &'a str, sequence: u64, timestamp: SystemTime, data: &'a [u8]) -> Self {
        Self {
            event: "frame",
            source,
            sequence,
            size: data.len(),
            width: None,
            height: None,
            format: "jpeg",
            timestamp: unix_seconds(timestamp),
            data,
        }
    }

    fn dimensions(&self) -> String {
        match (self.width, self.height) {
            (Some(width), Some(height)) => format!("{width}x{height}"),
            _ => "-".to_string(),
        }
    }
}

/// Renders events in one output format.
pub struct Printer<W: Write = io::Stdout> {
    out: W,
    format: OutputFormat,
}

impl Printer {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write> Printer<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub fn frame(&mut self, record: &FrameRecord<'_>) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, record)?;
                writeln!(self.out)?;
            }
            OutputFormat::Table => {
                let mut table = table(["SEQ", "SIZE", "DIMENSIONS", "FORMAT", "SOURCE"]);
                table.add_row(vec![
                    record.sequence.to_string(),
                    record.size.to_string(),
                    record.dimensions(),
                    record.format.to_string(),
                    record.source.to_string(),
                ]);
                writeln!(self.out, "{table}")?;
            }
            OutputFormat::Pretty => {
                writeln!(
                    self.out,
                    "frame #{} {} bytes {} {} from {}",
                    record.sequence,
                    record.size,
                    record.dimensions(),
                    record.format,
                    record.source
                )?;
            }
            OutputFormat::Raw => self.out.write_all(record.data)?,
        }
        self.out.flush()
    }

    /// A closing summary (stats, send report). Raw output skips it.
    pub fn summary<T: Serialize>(&mut self, title: &str, summary: &T) -> io::Result<()> {
        let fields = match serde_json::to_value(summary)? {
            Value::Object(fields) => fields,
            other => Map::from_iter([("value".to_string(), other)]),
        };

        match self.format {
            OutputFormat::Json => {
                let mut object = Map::new();
                object.insert("event".to_string(), Value::from(title));
                object.extend(fields);
                serde_json::to_writer(&mut self.out, &Value::Object(object))?;
                writeln!(self.out)?;
            }
            OutputFormat::Table => {
                let mut table = table([title.to_uppercase(), "VALUE".to_string()]);
                for (key, value) in &fields {
                    table.add_row(vec![key.clone(), value.to_string()]);
                }
                writeln!(self.out, "{table}")?;
            }
            OutputFormat::Pretty => {
                write!(self.out, "{title}:")?;
                for (key, value) in &fields {
                    write!(self.out, " {key}={value}")?;
                }
                writeln!(self.out)?;
            }
            OutputFormat::Raw => return Ok(()),
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn table(header: impl Into<comfy_table::Row>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn unix_seconds(time: SystemTime) -> String {
    time.duration_since(UNIX_EPOCH)
        .map(|d| format!("{:.3}", d.as_secs_f64()))
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    const JPEG: &[u8] = b"\xff\xd8x\xff\xd9";

    fn printed(format: OutputFormat, emit: impl FnOnce(&mut Printer<Vec<u8>>)) -> String {
        let mut printer = Printer::new(Vec::new(), format);
        emit(&mut printer);
        String::from_utf8(printer.into_inner()).unwrap()
    }

    #[test]
    fn jpeg_record_serializes_without_dimensions() {
        let record = FrameRecord::from_jpeg("file.mjpeg", 4, UNIX_EPOCH, JPEG);
        let line = printed(OutputFormat::Json, |p| p.frame(&record).unwrap());

        let value: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["sequence"], 4);
        assert_eq!(value["format"], "jpeg");
        assert_eq!(value["timestamp"], "0.000");
        assert!(value.get("width").is_none());
        assert!(value.get("data").is_none());
    }

    #[test]
    fn decoded_image_reports_dimensions() {
        let image = Image {
            width: 2,
            height: 1,
            format: PixelFormat::Rgb8,
            data: Bytes::from_static(&[0; 6]),
        };
        let record = FrameRecord::from_image("udp://0.0.0.0:5000", 1, &image);
        assert_eq!(record.dimensions(), "2x1");
        assert_eq!(record.format, "rgb8");

        let passthrough = Image::compressed(Bytes::from_static(JPEG));
        let record = FrameRecord::from_image("udp://0.0.0.0:5000", 2, &passthrough);
        assert_eq!(record.dimensions(), "-");
        assert_eq!(record.size, 5);
    }

    #[test]
    fn raw_writes_frame_bytes_only() {
        let record = FrameRecord::from_jpeg("stdin", 0, UNIX_EPOCH, JPEG);
        let mut printer = Printer::new(Vec::new(), OutputFormat::Raw);
        printer.frame(&record).unwrap();
        printer.summary("stats", &serde_json::json!({"frames": 1})).unwrap();
        assert_eq!(printer.into_inner(), JPEG);
    }

    #[test]
    fn json_summary_carries_event_name() {
        let line = printed(OutputFormat::Json, |p| {
            p.summary("stats", &serde_json::json!({"frames": 2, "oversized": 0}))
                .unwrap()
        });
        let value: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["event"], "stats");
        assert_eq!(value["frames"], 2);
    }

    #[test]
    fn pretty_summary_is_one_line() {
        let text = printed(OutputFormat::Pretty, |p| {
            p.summary("sent", &serde_json::json!({"frames": 3})).unwrap()
        });
        assert_eq!(text, "sent: frames=3\n");
    }

    #[test]
    fn table_frame_lists_source() {
        let record = FrameRecord::from_jpeg("cam.mjpeg", 9, UNIX_EPOCH, JPEG);
        let text = printed(OutputFormat::Table, |p| p.frame(&record).unwrap());
        assert!(text.contains("SEQ"));
        assert!(text.contains("cam.mjpeg"));
    }
}
