//! Live decoding loop and child process handling
//!
//! Audio is read at the input `--rate`, resampled to the decoder rate,
//! and scanned continuously. When a header is decoded, an optional
//! child process is spawned and the message audio (at the *input* rate)
//! is piped to its standard input until the end-of-message arrives or
//! the input is exhausted.

use std::process::Child;

use byteorder::{NativeEndian, WriteBytesExt};
use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use sirenrx::{Monitor, MonitorEvent, Resampler, SameHeader, DECODER_RATE};

use crate::cli::Args;
use crate::spawner;

// samples read from the input per processing block
const CHUNK: usize = 512;

/// Run the application
///
/// Runs the decoding loop with the given command-line `args`, a
/// fully-initialized `monitor` and `resampler`, and an `input` iterator
/// which returns each `i16` sample from some input source until it is
/// exhausted.
///
/// In demo mode (see `args`), we print a demo message, run the child
/// for eight seconds of audio, and then exit.
pub fn run<I>(args: &Args, mut monitor: Monitor, mut resampler: Resampler, mut input: I)
where
    I: Iterator<Item = i16>,
{
    if args.demo {
        run_demo(args, &mut input);
        return;
    }

    let mut child: Option<Child> = None;
    let mut chunk: Vec<i16> = Vec::with_capacity(CHUNK);

    loop {
        chunk.clear();
        while chunk.len() < CHUNK {
            match input.next() {
                Some(sa) => chunk.push(sa),
                None => break,
            }
        }
        if chunk.is_empty() {
            break;
        }

        // message audio is relayed at the input rate; decoding happens
        // at the decoder rate
        feed_child(&mut child, &chunk);

        let baseband: Vec<f32> = chunk.iter().map(|&sa| sa as f32).collect();
        for event in monitor.push(&resampler.process(&baseband)) {
            handle_event(args, event, &mut child);
        }
    }

    // input exhausted: let any pending vote expire
    let flush = vec![0.0f32; ((args.repeat_window + 2.0) * DECODER_RATE as f32) as usize];
    for event in monitor.push(&flush) {
        handle_event(args, event, &mut child);
    }

    finish_child(&mut child);
}

fn handle_event(args: &Args, event: MonitorEvent, child: &mut Option<Child>) {
    let result = match event {
        MonitorEvent::Decoded(result) => result,
        // state movement and alert flags are logged by the monitor
        _ => return,
    };

    if !args.quiet {
        match &result.header {
            Some(header) => println!("{}", header),
            None if result.is_eom => println!("NNNN"),
            None => {}
        }
    }
    debug!(
        "decode: confidence {:.2}, {} bursts agreed",
        result.confidence, result.bursts_agreed
    );

    if result.is_eom {
        finish_child(child);
    } else if let Some(header) = &result.header {
        // a new header while a child is running ends the old message
        finish_child(child);
        *child = start_child(args, header, result.confidence);
    }
}

fn start_child(args: &Args, header: &SameHeader, confidence: f32) -> Option<Child> {
    if args.child.is_empty() {
        debug!("no child process to spawn");
        return None;
    }

    match spawner::spawn(&args.child[0], &args.child[1..], header, confidence, args.rate) {
        Ok(child) => {
            debug!("spawned child process PID {}", child.id());
            Some(child)
        }
        Err(err) => {
            error!("unable to spawn child process: {}", err);
            None
        }
    }
}

// Pipe a block of input samples to the running child, if any.
// Write errors are suppressed; a dead child is reaped at message end.
fn feed_child(child: &mut Option<Child>, chunk: &[i16]) {
    if let Some(pipe) = child.as_mut().and_then(|proc| proc.stdin.as_mut()) {
        for &sa in chunk {
            let _ = pipe.write_i16::<NativeEndian>(sa);
        }
    }
}

// Close the child's stdin and wait for it to exit
fn finish_child(child: &mut Option<Child>) {
    let mut proc = match child.take() {
        Some(proc) => proc,
        None => return,
    };

    drop(proc.stdin.take());
    match proc.wait() {
        Ok(exit) if exit.success() => debug!("child process exited successfully"),
        Ok(exit) => warn!(
            "child process exited abnormally with status {}",
            exit.code().unwrap_or(1)
        ),
        Err(err) => error!("unable to await child process exit: {}", err),
    }
}

// Demo mode: issue a DMO message, run the child for eight seconds
// of input audio, and exit.
fn run_demo<I>(args: &Args, input: &mut I)
where
    I: Iterator<Item = i16>,
{
    warn!("demonstration (--demo) mode: the following messages are NOT LIVE!");

    let header = make_demo_header(&Utc::now());
    if !args.quiet {
        println!("{}", header);
    }

    let mut child = start_child(args, &header, 1.0);
    let mut remaining = args.rate as usize * 8;
    let mut chunk: Vec<i16> = Vec::with_capacity(CHUNK);
    while remaining > 0 {
        chunk.clear();
        while chunk.len() < CHUNK.min(remaining) {
            match input.next() {
                Some(sa) => chunk.push(sa),
                None => break,
            }
        }
        if chunk.is_empty() {
            break;
        }
        remaining -= chunk.len();
        feed_child(&mut child, &chunk);
    }

    if !args.quiet {
        println!("NNNN");
    }
    finish_child(&mut child);
}

// Create a demonstration header
fn make_demo_header(at: &DateTime<Utc>) -> SameHeader {
    let msg = format!("ZCZC-EAS-DMO-999000+0015-{}-N0 CALL -", at.format("%j%H%M"));
    SameHeader::new(msg).expect("unable to create DMO message")
}
