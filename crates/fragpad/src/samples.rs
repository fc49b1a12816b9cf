use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use tracing::{debug, warn};

/// Bytes per sample frame: one byte per frequency bin of a 1024-point FFT.
pub const SAMPLE_FRAME_BYTES: usize = 512;

/// Streams fixed-size frames from `path` into `frames` on a background
/// thread.
///
/// A named pipe fed by an audio analyser gives a live spectrum; a regular
/// file is read once and its last whole frame stays bound.
pub fn spawn_sample_reader(path: PathBuf, frame_len: usize, frames: Sender<Vec<u8>>) -> Result<()> {
    let file = File::open(&path)
        .with_context(|| format!("failed to open sample input {}", path.display()))?;
    thread::Builder::new()
        .name("fragpad-samples".into())
        .spawn(move || {
            let sent = pump_frames(file, frame_len, &frames);
            debug!(path = %path.display(), frames = sent, "sample input finished");
        })
        .context("failed to spawn sample reader thread")?;
    Ok(())
}

/// Reads whole frames until EOF or until the receiver goes away. A trailing
/// partial frame is dropped. Returns the number of frames sent.
fn pump_frames(mut input: impl Read, frame_len: usize, frames: &Sender<Vec<u8>>) -> usize {
    let mut sent = 0;
    loop {
        let mut frame = vec![0; frame_len];
        match input.read_exact(&mut frame) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => {
                warn!(%err, "failed to read sample input");
                break;
            }
        }
        if frames.send(frame).is_err() {
            break;
        }
        sent += 1;
    }
    sent
}
