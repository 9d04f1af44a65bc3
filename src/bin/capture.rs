use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

use usbscope::{CaptureRequest, CaptureResult, Coupling, Device, Transport, VoltageRange};

fn parse_range(text: &str) -> Result<VoltageRange, String> {
    let volts = text.trim_end_matches('V').parse::<f64>().map_err(|error| error.to_string())?;
    VoltageRange::ALL.into_iter()
        .find(|range| range.half_scale() == volts)
        .ok_or_else(|| format!("no +/- {} V range; use one of 5, 2.5, 1 or 0.5", volts))
}

/// Capture a waveform from a Hantek 6022 oscilloscope
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of samples per channel
    #[arg(short, long)]
    samples: Option<usize>,
    /// Time between samples, in seconds; selects a single-shot capture
    #[arg(short, long)]
    interval: Option<f64>,
    /// Length of a streaming capture, in seconds
    #[arg(short, long)]
    duration: Option<f64>,
    /// Pick the sample rate from a time per division, in seconds
    #[arg(long, conflicts_with_all = ["interval", "duration"])]
    time_per_div: Option<f64>,
    /// Half of the CH1 input range, in volts
    #[arg(long, default_value = "5", value_parser = parse_range)]
    ch1_range: VoltageRange,
    /// Half of the CH2 input range, in volts
    #[arg(long, default_value = "5", value_parser = parse_range)]
    ch2_range: VoltageRange,
    /// Use AC coupling on both channels
    #[arg(long)]
    ac: bool,
    /// Probe attenuation, e.g. 10 for a 10X probe
    #[arg(long, default_value_t = 1.0)]
    probe: f64,
    /// Write the capture to a CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Capture from a simulated instrument instead of hardware
    #[arg(long)]
    simulate: bool,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

fn run<T: Transport>(device: &mut Device<T>, args: &Args) -> usbscope::Result<CaptureResult> {
    let coupling = if args.ac { Coupling::AC } else { Coupling::DC };
    for (channel, range) in [args.ch1_range, args.ch2_range].into_iter().enumerate() {
        device.set_voltage_range(channel, range)?;
        device.set_coupling(channel, coupling)?;
        device.set_probe_attenuation(channel, args.probe)?;
    }
    if let Some(time_per_div) = args.time_per_div {
        device.set_time_per_division(time_per_div)?;
    }
    device.dispatch(&CaptureRequest {
        samples: args.samples,
        interval: args.interval,
        duration: args.duration,
    })
}

#[cfg(feature = "hardware")]
fn run_hardware(args: &Args) -> usbscope::Result<CaptureResult> {
    let mut device = usbscope::UsbDevice::connect()?;
    run(&mut device, args)
}

#[cfg(not(feature = "hardware"))]
fn run_hardware(_args: &Args) -> usbscope::Result<CaptureResult> {
    log::error!("built without hardware support; use --simulate");
    Err(usbscope::Error::NotFound)
}

fn summarize(result: &CaptureResult) {
    println!("captured {} samples at {} ({:.6} s)",
        result.sample_count(), result.rate_label(), result.duration());
    for channel in 0..usbscope::CHANNEL_COUNT {
        let volts = result.volts(channel);
        let min = volts.iter().copied().fold(f64::INFINITY, f64::min);
        let max = volts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = volts.iter().sum::<f64>() / volts.len().max(1) as f64;
        println!("CH{} ({}): min {:.3} V, max {:.3} V, mean {:.3} V",
            channel + 1, result.ranges().channel(channel).range, min, max, mean);
    }
}

fn main() -> usbscope::Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_default_env()
        .format_timestamp_micros()
        .filter_level(args.verbose.log_level_filter())
        .parse_default_env()
        .init();

    let result = if args.simulate {
        run(&mut Device::simulated()?, &args)?
    } else {
        run_hardware(&args)?
    };
    summarize(&result);
    if let Some(path) = &args.output {
        usbscope::export::save_csv(path, &result)?;
    }
    Ok(())
}
