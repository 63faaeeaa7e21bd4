//! Ordered composition of filters and processors.

use std::sync::Arc;
use std::time::Duration;

use media_core::{ErrorKind, MediaKind, Packet, Result, TimeBase, rescale_q};
use tracing::{debug, trace};

use crate::context::StreamerContext;
use crate::processor::{MediaProcessor, PacketFilter};
use crate::selector::StreamSelector;
use crate::source::PacketSource;

/// An ordered list of packet filters and media processors sharing one
/// setup/first-packet/per-packet lifecycle.
///
/// Per packet: the stream-selection mask is consulted first, then every
/// filter (ANDed, short-circuiting on the first rejection), then every
/// processor in order, stopping at the first failure.
pub struct MediaProcessorChain {
    context: Arc<StreamerContext>,
    selector: Option<Box<dyn StreamSelector>>,
    filters: Vec<Box<dyn PacketFilter>>,
    processors: Vec<Box<dyn MediaProcessor>>,
    selected: Vec<bool>,
    time_bases: Vec<TimeBase>,
    saw_first_packet: bool,
}

impl MediaProcessorChain {
    pub fn new(context: Arc<StreamerContext>) -> Self {
        Self {
            context,
            selector: None,
            filters: Vec::new(),
            processors: Vec::new(),
            selected: Vec::new(),
            time_bases: Vec::new(),
            saw_first_packet: false,
        }
    }

    /// Install the stream selector consulted once at setup. At most one
    /// selector may be set.
    pub fn set_stream_selector(&mut self, selector: Box<dyn StreamSelector>) -> Result<()> {
        if self.selector.is_some() {
            return Err(ErrorKind::AlreadySet.into());
        }
        self.selector = Some(selector);
        Ok(())
    }

    pub fn add_packet_filter(&mut self, filter: Box<dyn PacketFilter>) {
        self.filters.push(filter);
    }

    pub fn add_processor(&mut self, processor: Box<dyn MediaProcessor>) {
        self.processors.push(processor);
    }

    /// Resolve the stream selection and propagate setup to filters then
    /// processors, stopping at the first failure.
    ///
    /// `default_selected` seeds the mask when no selector is installed; when
    /// a selector is present it wins and the default is ignored.
    pub fn setup(
        &mut self,
        source: &dyn PacketSource,
        default_selected: Option<&[bool]>,
    ) -> Result<()> {
        let count = source.num_streams();
        if count == 0 {
            return Err(ErrorKind::NoStream.into());
        }

        if default_selected.is_some() && self.selector.is_some() {
            debug!(
                "{} chain was handed a default stream selection and has a selector; \
                 deferring to the selector",
                self.context.name
            );
        }

        self.selected = match self.selector.as_mut() {
            Some(selector) => selector.select(source)?,
            None => match default_selected {
                Some(defaults) => defaults.to_vec(),
                None => vec![true; count],
            },
        };
        self.time_bases = (0..count)
            .map(|i| source.stream(i).map(|s| s.time_base).unwrap_or(TimeBase::MILLIS))
            .collect();

        for filter in &mut self.filters {
            filter.setup(source)?;
        }
        for processor in &mut self.processors {
            processor.setup(source, &self.selected)?;
        }
        Ok(())
    }

    pub fn pre_first_packet(&mut self) -> Result<()> {
        for processor in &mut self.processors {
            processor.pre_first_packet()?;
        }
        self.saw_first_packet = true;
        Ok(())
    }

    /// Apply the selection mask and filters, then hand the packet to every
    /// processor in order.
    pub fn handle_packet(&mut self, packet: &Packet, kind: MediaKind) -> Result<()> {
        if !self.saw_first_packet {
            self.pre_first_packet()?;
        }

        if !self.selected.get(packet.stream_index).copied().unwrap_or(false) {
            trace!(
                "{} dropping packet on unselected stream {}",
                self.context.name, packet.stream_index
            );
            return Ok(());
        }

        if let Ok(mut stats) = self.context.statistics.lock() {
            stats.processed_packets += 1;
            stats.payload_bytes += packet.size();
            if packet.keyframe {
                stats.keyframes += 1;
            }
            if packet.duration > 0 {
                if let Some(tb) = self.time_bases.get(packet.stream_index) {
                    let millis = rescale_q(packet.duration, *tb, TimeBase::MILLIS);
                    stats.duration += Duration::from_millis(millis.max(0) as u64);
                }
            }
        }

        for filter in &mut self.filters {
            if !filter.filter(packet, kind) {
                if let Ok(mut stats) = self.context.statistics.lock() {
                    stats.filtered_packets += 1;
                }
                return Ok(());
            }
        }

        for processor in &mut self.processors {
            processor.handle_packet(packet, kind)?;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        for processor in &mut self.processors {
            processor.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::FnPacketFilter;
    use crate::selector::FnStreamSelector;
    use crate::source::StreamTable;
    use bytes::Bytes;
    use media_core::{CodecId, CodecParameters, MediaError, StreamDescriptor, TimeBase};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingProcessor {
        log: Rc<RefCell<Vec<usize>>>,
        fail_on: Option<usize>,
    }

    impl MediaProcessor for RecordingProcessor {
        fn setup(&mut self, _source: &dyn PacketSource, _selected: &[bool]) -> Result<()> {
            Ok(())
        }

        fn handle_packet(&mut self, packet: &Packet, _kind: MediaKind) -> Result<()> {
            if self.fail_on == Some(packet.stream_index) {
                return Err(ErrorKind::BadState.into());
            }
            self.log.borrow_mut().push(packet.stream_index);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn two_stream_source() -> StreamTable {
        StreamTable::new(vec![
            StreamDescriptor {
                index: 0,
                time_base: TimeBase::new(1, 90000),
                params: CodecParameters::video(CodecId::H264, 640, 480),
            },
            StreamDescriptor {
                index: 1,
                time_base: TimeBase::new(1, 48000),
                params: CodecParameters::audio(CodecId::Aac, 48000, 2),
            },
        ])
    }

    fn packet(stream_index: usize) -> Packet {
        Packet::new(stream_index, Bytes::from_static(b"x"))
    }

    fn init_logging() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    #[test]
    fn filters_are_anded_and_short_circuit() {
        init_logging();
        let log = Rc::new(RefCell::new(Vec::new()));
        let second_ran = Rc::new(RefCell::new(false));

        let mut chain = MediaProcessorChain::new(StreamerContext::arc_new());
        chain.add_packet_filter(Box::new(FnPacketFilter::new(|p: &Packet, _| {
            p.stream_index == 0
        })));
        {
            let second_ran = second_ran.clone();
            chain.add_packet_filter(Box::new(FnPacketFilter::new(move |_: &Packet, _| {
                *second_ran.borrow_mut() = true;
                true
            })));
        }
        chain.add_processor(Box::new(RecordingProcessor {
            log: log.clone(),
            fail_on: None,
        }));

        chain.setup(&two_stream_source(), None).unwrap();
        chain.handle_packet(&packet(1), MediaKind::Audio).unwrap();
        // first filter rejected, second must not have run
        assert!(!*second_ran.borrow());
        assert!(log.borrow().is_empty());

        chain.handle_packet(&packet(0), MediaKind::Video).unwrap();
        assert!(*second_ran.borrow());
        assert_eq!(*log.borrow(), vec![0]);
    }

    #[test]
    fn unselected_streams_are_skipped_silently() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut chain = MediaProcessorChain::new(StreamerContext::arc_new());
        chain
            .set_stream_selector(Box::new(FnStreamSelector::new(
                |_, selections: &mut [bool]| {
                    selections[1] = false;
                    true
                },
            )))
            .unwrap();
        chain.add_processor(Box::new(RecordingProcessor {
            log: log.clone(),
            fail_on: None,
        }));

        chain.setup(&two_stream_source(), None).unwrap();
        chain.handle_packet(&packet(1), MediaKind::Audio).unwrap();
        chain.handle_packet(&packet(0), MediaKind::Video).unwrap();
        assert_eq!(*log.borrow(), vec![0]);
    }

    #[test]
    fn processor_failure_propagates() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut chain = MediaProcessorChain::new(StreamerContext::arc_new());
        chain.add_processor(Box::new(RecordingProcessor {
            log: log.clone(),
            fail_on: Some(0),
        }));
        chain.setup(&two_stream_source(), None).unwrap();
        let err = chain.handle_packet(&packet(0), MediaKind::Video).unwrap_err();
        assert_eq!(err, MediaError::Pipeline(ErrorKind::BadState));
    }

    #[test]
    fn second_selector_is_rejected() {
        let mut chain = MediaProcessorChain::new(StreamerContext::arc_new());
        chain
            .set_stream_selector(Box::new(FnStreamSelector::new(|_, _: &mut [bool]| true)))
            .unwrap();
        let err = chain
            .set_stream_selector(Box::new(FnStreamSelector::new(|_, _: &mut [bool]| true)))
            .unwrap_err();
        assert_eq!(err, MediaError::Pipeline(ErrorKind::AlreadySet));
    }

    #[test]
    fn statistics_accumulate_per_admitted_packet() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let context = StreamerContext::arc_new();
        let mut chain = MediaProcessorChain::new(context.clone());
        chain.add_processor(Box::new(RecordingProcessor {
            log,
            fail_on: None,
        }));
        chain.setup(&two_stream_source(), None).unwrap();

        let mut p = packet(0);
        p.keyframe = true;
        p.duration = 90000; // one second in the video stream's 1/90000 base
        chain.handle_packet(&p, MediaKind::Video).unwrap();

        let stats = context.statistics.lock().unwrap();
        assert_eq!(stats.processed_packets, 1);
        assert_eq!(stats.keyframes, 1);
        assert_eq!(stats.payload_bytes, 1);
        assert_eq!(stats.duration, Duration::from_secs(1));
    }

    #[test]
    fn empty_source_fails_setup() {
        let mut chain = MediaProcessorChain::new(StreamerContext::arc_new());
        let err = chain.setup(&StreamTable::default(), None).unwrap_err();
        assert_eq!(err, MediaError::Pipeline(ErrorKind::NoStream));
    }
}
