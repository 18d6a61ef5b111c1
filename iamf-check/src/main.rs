// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// Justification: Fields on DecoderOptions may change at any time, but iamf-check doesn't want to
// be updated every time those fields change, therefore always fill in the remaining fields with
// default values.
#![allow(clippy::needless_update)]

mod levels;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use iamf::core::audio::OutputLayout;
use iamf::core::conv::SampleFormat;
use iamf::core::errors::{decode_error, Result};
use iamf::decoder::{
    AudioOutput, DecodeStatus, DecoderOptions, DecoderState, IamfDecoder, LimiterOptions,
};

use clap::Parser;
use log::{info, warn};
use serde::Serialize;

use crate::levels::{read_samples, ChannelLevels, LevelMeter};

#[derive(Parser, Debug)]
#[command(name = "IAMF Check", version, about = "Decode an IAMF stream and report its levels")]
struct Args {
    /// The layout to render to: mono, stereo, 3.1.2, 5.1, 5.1.2, 5.1.4, 7.1, 7.1.2, 7.1.4, or
    /// binaural
    #[arg(long, short = 'l', default_value = "stereo")]
    layout: OutputLayout,
    /// The mix presentation to decode
    #[arg(long, short = 'm')]
    mix_presentation: Option<u64>,
    /// Resample the output to this rate in Hz
    #[arg(long, short = 'r')]
    rate: Option<u32>,
    /// Normalize the program loudness to this target in LKFS
    #[arg(long)]
    loudness: Option<f32>,
    /// The output sample format: s16, s24, s32, or f32
    #[arg(long, short = 'b', default_value = "s16")]
    bit_depth: SampleFormat,
    /// Disable the output limiter
    #[arg(long)]
    no_limiter: bool,
    /// Write the decoded interleaved PCM to this file
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
    /// The input file path
    input: PathBuf,
}

#[derive(Serialize)]
struct Report {
    input: String,
    profile: Option<String>,
    mix_presentation_id: u64,
    mix_presentations: Vec<u64>,
    channels: usize,
    sampling_rate: u32,
    frame_size: usize,
    temporal_units: u64,
    dropped: u64,
    samples: u64,
    duration_secs: f64,
    levels: Vec<ChannelLevels>,
}

/// The sink of decoded output.
struct Sink {
    meter: LevelMeter,
    samples: Vec<f32>,
    writer: Option<BufWriter<File>>,
}

impl Sink {
    fn write(&mut self, output: &AudioOutput) -> Result<()> {
        if output.channels != self.meter.channels() {
            warn!("output changed to {} channels, restarting level measurement", output.channels);
            self.meter = LevelMeter::new(output.channels);
        }

        read_samples(&output.data, output.format, &mut self.samples);
        self.meter.update(&self.samples);

        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(&output.data)?;
        }

        Ok(())
    }
}

fn run(args: &Args) -> Result<Report> {
    let options = DecoderOptions {
        output_layout: args.layout,
        mix_presentation_id: args.mix_presentation,
        sampling_rate: args.rate,
        normalization_loudness: args.loudness,
        bit_depth: args.bit_depth,
        limiter: LimiterOptions { enabled: !args.no_limiter, ..Default::default() },
        ..Default::default()
    };

    let data = std::fs::read(&args.input)?;

    let mut decoder: IamfDecoder<'static> = iamf::default::make_decoder(options);

    let mut pos = decoder.configure(&data)?;

    if decoder.state() != DecoderState::Run {
        return decode_error("check: the stream has incomplete descriptors");
    }

    let info = decoder.stream_info()?;

    info!(
        "decoding mix presentation {} of {:?}: {} channels at {} Hz",
        info.mix_presentation_id, info.mix_presentations, info.channels, info.sampling_rate
    );

    let writer = match &args.output {
        Some(path) => Some(BufWriter::new(File::create(path)?)),
        None => None,
    };

    let mut sink = Sink { meter: LevelMeter::new(info.channels), samples: Vec::new(), writer };

    let mut temporal_units = 0;
    let mut dropped = 0;

    while pos < data.len() {
        let decoded = decoder.decode(&data[pos..])?;
        pos += decoded.consumed;

        match decoded.status {
            DecodeStatus::Frame { .. } => {
                temporal_units += 1;
                sink.write(decoder.last_decoded())?;
            }
            DecodeStatus::Dropped => {
                temporal_units += 1;
                dropped += 1;
            }
            DecodeStatus::NeedMoreData => {
                if pos < data.len() {
                    warn!("the stream ends with {} bytes of a truncated obu", data.len() - pos);
                }
                break;
            }
        }
    }

    match decoder.flush() {
        Ok(samples) if samples > 0 => sink.write(decoder.last_decoded())?,
        Ok(_) => (),
        Err(err) => warn!("flush failed: {}", err),
    }

    if let Some(writer) = sink.writer.as_mut() {
        writer.flush()?;
    }

    // The stream may have been reconfigured by descriptors along the way.
    let info = decoder.stream_info().unwrap_or(info);
    let samples = sink.meter.samples();

    Ok(Report {
        input: args.input.display().to_string(),
        profile: info.profile.map(|profile| profile.to_string()),
        mix_presentation_id: info.mix_presentation_id,
        mix_presentations: info.mix_presentations,
        channels: info.channels,
        sampling_rate: info.sampling_rate,
        frame_size: info.frame_size,
        temporal_units,
        dropped,
        samples,
        duration_secs: samples as f64 / f64::from(info.sampling_rate.max(1)),
        levels: sink.meter.levels(),
    })
}

fn print_report(report: &Report) {
    println!("Input Path: {}", report.input);
    println!();
    println!("Stream");
    println!("=================================================");
    println!();
    println!("  Profile:               {}", report.profile.as_deref().unwrap_or("-"));
    println!("  Mix Presentations:     {:?}", report.mix_presentations);
    println!("  Mix Presentation:      {}", report.mix_presentation_id);
    println!("  Channels:              {}", report.channels);
    println!("  Sample Rate:           {}", report.sampling_rate);
    println!("  Frame Size:            {}", report.frame_size);
    println!();
    println!("Decode Results");
    println!("=================================================");
    println!();
    println!(
        "  Dropped/Total Temporal Units: {:>12}/{:>12}",
        report.dropped, report.temporal_units
    );
    println!("  Samples per Channel:          {:>12}", report.samples);
    println!("  Duration:                     {:>12.3}s", report.duration_secs);
    println!();

    for (ch, levels) in report.levels.iter().enumerate() {
        println!(
            "  [{:>2}] peak={:>8.2} dBFS, rms={:>8.2} dBFS, clipped={}",
            ch, levels.peak_dbfs, levels.rms_dbfs, levels.clipped
        );
    }
    println!();
}

fn main() {
    pretty_env_logger::init();

    let args = Args::parse();

    let report = match run(&args) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("Check interrupted by error: {}", err);
            std::process::exit(2);
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(err) => {
                eprintln!("Failed to serialize the report: {}", err);
                std::process::exit(2);
            }
        }
    }
    else {
        print_report(&report);
    }

    let ret = if report.dropped == 0 {
        if !args.json {
            println!("PASS");
        }
        0
    }
    else {
        if !args.json {
            println!("FAIL");
        }
        1
    };

    std::process::exit(ret);
}
