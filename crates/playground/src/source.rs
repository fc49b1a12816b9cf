//! Collaborators that feed the playground: shader text and sample buffers.

use crossbeam_channel::{Receiver, TryRecvError};
use tracing::debug;

/// Where the current shader text comes from (an editor widget, a file...).
pub trait TextSource {
    fn get_value(&self) -> &str;
    fn set_value(&mut self, text: String);
    /// Pulls pending edits and reports whether the text changed since the
    /// previous call.
    fn changed(&mut self) -> bool;
}

/// Plain in-memory text buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferSource {
    text: String,
    changed: bool,
}

impl BufferSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            changed: true,
        }
    }
}

impl TextSource for BufferSource {
    fn get_value(&self) -> &str {
        &self.text
    }

    fn set_value(&mut self, text: String) {
        if text != self.text {
            self.text = text;
            self.changed = true;
        }
    }

    fn changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}

/// Text buffer updated from another thread, for example a file watcher.
#[derive(Debug)]
pub struct ChannelTextSource {
    buffer: BufferSource,
    updates: Receiver<String>,
    disconnected: bool,
}

impl ChannelTextSource {
    pub fn new(initial: impl Into<String>, updates: Receiver<String>) -> Self {
        Self {
            buffer: BufferSource::new(initial),
            updates,
            disconnected: false,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

impl TextSource for ChannelTextSource {
    fn get_value(&self) -> &str {
        self.buffer.get_value()
    }

    fn set_value(&mut self, text: String) {
        self.buffer.set_value(text);
    }

    fn changed(&mut self) -> bool {
        loop {
            match self.updates.try_recv() {
                Ok(text) => self.buffer.set_value(text),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.disconnected {
                        debug!("text source channel disconnected");
                        self.disconnected = true;
                    }
                    break;
                }
            }
        }
        self.buffer.changed()
    }
}

/// Producer of the byte buffer bound to `iChannel0` (audio spectrum etc.).
pub trait SampleSource {
    /// Newest buffer since the previous call, if any.
    fn latest_samples(&mut self) -> Option<Vec<u8>>;
}

/// Sample source that never has data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSamples;

impl SampleSource for NoSamples {
    fn latest_samples(&mut self) -> Option<Vec<u8>> {
        None
    }
}

/// Channel-fed sample source; only the newest pending buffer is kept.
#[derive(Debug)]
pub struct ChannelSampleSource {
    buffers: Receiver<Vec<u8>>,
}

impl ChannelSampleSource {
    pub fn new(buffers: Receiver<Vec<u8>>) -> Self {
        Self { buffers }
    }
}

impl SampleSource for ChannelSampleSource {
    fn latest_samples(&mut self) -> Option<Vec<u8>> {
        self.buffers.try_iter().last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn buffer_reports_each_change_once() {
        let mut source = BufferSource::new("a");
        assert!(source.changed());
        assert!(!source.changed());
        source.set_value("a".into());
        assert!(!source.changed());
        source.set_value("b".into());
        assert!(source.changed());
        assert_eq!(source.get_value(), "b");
    }

    #[test]
    fn channel_source_applies_latest_update() {
        let (tx, rx) = unbounded();
        let mut source = ChannelTextSource::new("first", rx);
        assert!(source.changed());
        tx.send("second".to_string()).unwrap();
        tx.send("third".to_string()).unwrap();
        assert!(source.changed());
        assert_eq!(source.get_value(), "third");
        drop(tx);
        assert!(!source.changed());
        assert!(source.is_disconnected());
    }

    #[test]
    fn channel_samples_drain_to_newest() {
        let (tx, rx) = unbounded();
        let mut source = ChannelSampleSource::new(rx);
        assert_eq!(source.latest_samples(), None);
        tx.send(vec![1, 2]).unwrap();
        tx.send(vec![3, 4]).unwrap();
        assert_eq!(source.latest_samples(), Some(vec![3, 4]));
        assert_eq!(source.latest_samples(), None);
    }
}
