//! Export of captures as comma-separated values, one row per sample.

use std::io;
use std::path::Path;

use crate::Result;
use crate::capture::CaptureResult;

pub const HEADER: [&str; 3] = ["time_s", "ch1_v", "ch2_v"];

pub fn write_csv<W: io::Write>(writer: W, result: &CaptureResult) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(HEADER).map_err(io::Error::from)?;
    for (index, time) in result.time().iter().enumerate() {
        writer.serialize((time, result.volts(0)[index], result.volts(1)[index]))
            .map_err(io::Error::from)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn save_csv(path: impl AsRef<Path>, result: &CaptureResult) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_csv(file, result)?;
    log::info!("saved {} samples to {}", result.sample_count(), path.as_ref().display());
    Ok(())
}
