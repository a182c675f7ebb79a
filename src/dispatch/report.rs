use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::types::{IndicatorSnapshot, Symbol, TimeFrame};

/// One line per scan tick: the indicator snapshot plus what came of it.
/// Append-only; nothing in the scanner ever reads it back.
pub struct ScanReportWriter {
    file: Mutex<File>,
}

impl ScanReportWriter {
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let exists = path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open scan report {}", path.display()))?;
        if !exists {
            writeln!(
                file,
                "timestamp,symbol,timeframe,close,ema_fast,ema_slow,ema_trend,rsi,adx,atr,vwap,volume_ratio,outcome"
            )?;
        }
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &self,
        at: DateTime<Utc>,
        symbol: &Symbol,
        timeframe: TimeFrame,
        close: rust_decimal::Decimal,
        snapshot: &IndicatorSnapshot,
        outcome: &str,
    ) -> anyhow::Result<()> {
        let mut file = self.file.lock().expect("scan report lock poisoned");
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{},{},{},{},{}",
            at.format("%Y-%m-%d %H:%M:%S"),
            symbol,
            timeframe,
            close,
            snapshot.ema_fast,
            snapshot.ema_slow,
            snapshot.ema_trend,
            snapshot.rsi,
            snapshot.adx,
            snapshot.atr,
            snapshot.vwap,
            snapshot.volume_ratio,
            outcome,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::sample_snapshot;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rows_append_with_header_once() {
        let dir = std::env::temp_dir().join(format!("scan_report_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("report.csv");
        let _ = std::fs::remove_file(&path);

        let writer = ScanReportWriter::create(&path).unwrap();
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        writer
            .append(at, &Symbol::parse("BTC"), TimeFrame::M5, dec!(100), &sample_snapshot(), "none")
            .unwrap();
        drop(writer);

        let writer = ScanReportWriter::create(&path).unwrap();
        writer
            .append(at, &Symbol::parse("BTC"), TimeFrame::M5, dec!(101), &sample_snapshot(), "signal:ema_crossover")
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,"));
        assert!(lines[2].ends_with("signal:ema_crossover"));
        let _ = std::fs::remove_file(&path);
    }
}
