use std::io::Write;
use std::path::Path;

use csv::Writer;

use crate::library::record::{key_name, SampleRecord};
use crate::Result;

pub struct Reporter;

impl Reporter {
    pub fn new() -> Self {
        Self
    }

    pub fn generate_catalog_report<'a>(
        &self,
        records: impl IntoIterator<Item = &'a SampleRecord>,
        output_path: impl AsRef<Path>,
    ) -> Result<usize> {
        let output_path_ref = output_path.as_ref();
        let count = self.write_catalog(records, Writer::from_path(output_path_ref)?)?;
        println!("Report generated: {}", output_path_ref.display());
        Ok(count)
    }

    /// Write one CSV row per record; returns the number of rows written.
    pub fn write_catalog<'a, W: Write>(
        &self,
        records: impl IntoIterator<Item = &'a SampleRecord>,
        mut writer: Writer<W>,
    ) -> Result<usize> {
        writer.write_record([
            "Path",
            "Title",
            "Length (s)",
            "Peak (dB)",
            "Loudness (LUFS)",
            "Tempo (BPM)",
            "Key",
            "Analysed",
        ])?;

        let mut count = 0;
        for record in records {
            writer.write_record(&[
                record.path().display().to_string(),
                record.title().to_string(),
                format!("{:.3}", record.length()),
                format!("{:.1}", record.loudness_db()),
                format!("{:.1}", record.loudness_lufs()),
                record.tempo().map_or_else(String::new, |t| t.to_string()),
                record.key().and_then(key_name).unwrap_or_default(),
                record.is_analyzed().to_string(),
            ])?;
            count += 1;
        }

        writer.flush()?;
        Ok(count)
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}
