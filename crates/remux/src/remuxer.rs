//! The packet-copy processor.

use std::path::Path;
use std::time::Instant;

use media_core::{ErrorKind, MediaKind, Packet, Result, TimeBase, rescale_q};
use mux::{Muxer, UriMuxer};
use pipeline_core::{MediaProcessor, PacketSource};
use tracing::{debug, info, warn};

/// Consecutive delivery failures tolerated before the stream is aborted.
/// Transient sink hiccups on live sources should not kill a long recording;
/// a run of failures longer than this means the output is gone for good.
pub const DEFAULT_MAX_REMUX_ERRORS: u32 = 20;

/// Copies packets from selected input streams into a muxer.
///
/// Stream mapping is fixed at setup: each selected input stream whose kind
/// is remuxable gets one output stream, other input streams are silently
/// skipped thereafter. Packets arriving without a pts (live sources) get one
/// synthesized from wall-clock time elapsed since the first packet.
pub struct Remuxer {
    muxer: Box<dyn Muxer>,
    /// Input stream index to output stream index, `None` for unmapped.
    stream_map: Vec<Option<usize>>,
    input_time_bases: Vec<TimeBase>,
    start: Option<Instant>,
    max_errors: u32,
    consecutive_errors: u32,
    closed: bool,
}

impl Remuxer {
    pub fn new(muxer: Box<dyn Muxer>) -> Self {
        Self::with_error_tolerance(muxer, DEFAULT_MAX_REMUX_ERRORS)
    }

    pub fn with_error_tolerance(muxer: Box<dyn Muxer>, max_errors: u32) -> Self {
        Self {
            muxer,
            stream_map: Vec::new(),
            input_time_bases: Vec::new(),
            start: None,
            max_errors,
            consecutive_errors: 0,
            closed: false,
        }
    }

    /// Remux straight to an FLV file at `path`.
    pub fn to_uri(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Box::new(UriMuxer::create(path)?)))
    }

    fn remux_packet(&mut self, packet: &Packet) -> Result<()> {
        let Some(Some(output_index)) = self.stream_map.get(packet.stream_index).copied() else {
            return Ok(());
        };
        let input_time_base = self.input_time_bases[packet.stream_index];

        if packet.pts.is_some() {
            return self
                .muxer
                .write_packet(packet, input_time_base, output_index);
        }

        // Live sources can deliver packets with no timestamps at all. Stamp
        // them with wall-clock time since the first packet, expressed in the
        // input time base so the normal rescale path applies.
        let elapsed_millis = self
            .start
            .map(|s| s.elapsed().as_millis() as i64)
            .unwrap_or(0);
        let pts = rescale_q(elapsed_millis, TimeBase::MILLIS, input_time_base);
        let mut stamped = packet.clone_for_output();
        stamped.pts = Some(pts);
        stamped.dts = Some(pts);
        self.muxer
            .write_packet(&stamped, input_time_base, output_index)
    }

    fn map_streams(&mut self, source: &dyn PacketSource, selected: &[bool]) -> Result<()> {
        self.stream_map.clear();
        self.input_time_bases.clear();

        for index in 0..source.num_streams() {
            let stream = source.stream(index).ok_or(ErrorKind::NoStream)?;
            self.input_time_bases.push(stream.time_base);

            if !selected.get(index).copied().unwrap_or(false)
                || !stream.kind().is_remuxable()
            {
                self.stream_map.push(None);
                continue;
            }

            let mut params = stream.params.clone();
            // Tags are container-instance-specific; let the output container
            // pick its own unless the source provides a translatable one.
            params.codec_tag = source.codec_tag(index);
            let output_index = self.muxer.create_next_stream(&params)?;
            debug!(input = index, output = output_index, kind = ?stream.kind(), "mapped stream");
            self.stream_map.push(Some(output_index));
        }

        if self.stream_map.iter().all(|m| m.is_none()) {
            warn!("no remuxable stream was selected");
            return Err(ErrorKind::NoStream.into());
        }
        self.muxer.ready()
    }
}

impl MediaProcessor for Remuxer {
    fn setup(&mut self, source: &dyn PacketSource, selected: &[bool]) -> Result<()> {
        self.muxer.open()?;
        if let Err(e) = self.map_streams(source, selected) {
            // A half-built output must not leak a trailer; mark it failed
            // before reporting.
            self.muxer.fail();
            return Err(e);
        }
        Ok(())
    }

    fn pre_first_packet(&mut self) -> Result<()> {
        self.start = Some(Instant::now());
        Ok(())
    }

    fn handle_packet(&mut self, packet: &Packet, _kind: MediaKind) -> Result<()> {
        match self.remux_packet(packet) {
            Ok(()) => {
                self.consecutive_errors = 0;
                Ok(())
            }
            Err(e) => {
                self.consecutive_errors += 1;
                if self.consecutive_errors > self.max_errors {
                    warn!(
                        failures = self.consecutive_errors,
                        "giving up on output after repeated delivery failures: {e}"
                    );
                    return Err(e);
                }
                warn!(
                    failures = self.consecutive_errors,
                    "packet delivery failed, continuing: {e}"
                );
                Ok(())
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!("closing remux output");
        self.muxer.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use media_core::{CodecId, CodecParameters, MediaError, StreamDescriptor};
    use mux::mock::{MockMuxer, MuxerLog};
    use pipeline_core::StreamTable;
    use std::sync::{Arc, Mutex};

    fn source() -> StreamTable {
        StreamTable::new(vec![
            StreamDescriptor {
                index: 0,
                time_base: TimeBase::new(1, 90000),
                params: CodecParameters::video(CodecId::H264, 1280, 720),
            },
            StreamDescriptor {
                index: 1,
                time_base: TimeBase::new(1, 48000),
                params: CodecParameters::audio(CodecId::Aac, 48000, 2),
            },
            StreamDescriptor {
                index: 2,
                time_base: TimeBase::MILLIS,
                params: CodecParameters {
                    kind: MediaKind::Data,
                    ..Default::default()
                },
            },
        ])
    }

    fn packet(stream: usize, pts: i64) -> Packet {
        let mut p = Packet::new(stream, Bytes::from_static(b"payload"));
        p.pts = Some(pts);
        p.dts = Some(pts);
        p
    }

    fn recording_remuxer() -> (Remuxer, Arc<Mutex<MuxerLog>>) {
        let (muxer, log) = MockMuxer::recording();
        (Remuxer::new(Box::new(muxer)), log)
    }

    #[test]
    fn maps_selected_remuxable_streams_only() {
        let (mut remuxer, log) = recording_remuxer();
        remuxer.setup(&source(), &[true, true, true]).unwrap();

        // data stream is not remuxable and gets no output stream
        assert_eq!(
            log.lock().unwrap().created,
            vec![MediaKind::Video, MediaKind::Audio]
        );
        assert!(log.lock().unwrap().readied);
        assert_eq!(remuxer.stream_map, vec![Some(0), Some(1), None]);
    }

    #[test]
    fn deselected_streams_are_skipped() {
        let (mut remuxer, log) = recording_remuxer();
        remuxer.setup(&source(), &[true, false, false]).unwrap();
        remuxer.pre_first_packet().unwrap();

        remuxer.handle_packet(&packet(0, 90000), MediaKind::Video).unwrap();
        remuxer.handle_packet(&packet(1, 48000), MediaKind::Audio).unwrap();
        remuxer.close().unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.packets.len(), 1);
        assert_eq!(log.packets[0].stream_index, 0);
    }

    #[test]
    fn nothing_selected_is_an_error() {
        let (mut remuxer, _log) = recording_remuxer();
        let err = remuxer.setup(&source(), &[false, false, false]).unwrap_err();
        assert_eq!(err, MediaError::Pipeline(ErrorKind::NoStream));
    }

    #[test]
    fn failed_stream_creation_fails_the_output() {
        let (mut muxer, log) = MockMuxer::recording();
        muxer.fail_stream_creation = true;
        let mut remuxer = Remuxer::new(Box::new(muxer));
        let err = remuxer.setup(&source(), &[true, true, false]).unwrap_err();
        assert_eq!(err, MediaError::Pipeline(ErrorKind::FailedCreateMuxer));
        // the partially-built output was marked failed, not left open
        assert!(log.lock().unwrap().failed);
    }

    #[test]
    fn timestamps_are_rescaled_into_the_output() {
        let (mut remuxer, log) = recording_remuxer();
        remuxer.setup(&source(), &[true, false, false]).unwrap();
        remuxer.pre_first_packet().unwrap();

        remuxer.handle_packet(&packet(0, 90000), MediaKind::Video).unwrap();
        remuxer.handle_packet(&packet(0, 180000), MediaKind::Video).unwrap();
        remuxer.close().unwrap();

        let log = log.lock().unwrap();
        // first packet defines the zero origin, the next lands 1000ms later
        assert_eq!(log.packets[0].pts, Some(0));
        assert_eq!(log.packets[1].pts, Some(1000));
    }

    #[test]
    fn missing_pts_is_synthesized_from_wall_clock() {
        let (mut remuxer, log) = recording_remuxer();
        remuxer.setup(&source(), &[true, false, false]).unwrap();
        remuxer.pre_first_packet().unwrap();

        let mut p = Packet::new(0, Bytes::from_static(b"live"));
        p.pts = None;
        p.dts = None;
        remuxer.handle_packet(&p, MediaKind::Video).unwrap();
        remuxer.close().unwrap();

        let log = log.lock().unwrap();
        let out = &log.packets[0];
        assert!(out.pts.is_some());
        assert_eq!(out.pts, out.dts);
        // the synthesized timestamp cannot precede the pipeline start
        assert!(out.pts.unwrap() >= 0);
    }

    /// Muxer whose writes fail while `failures_left` is positive.
    struct FlakyMuxer {
        inner: MockMuxer,
        failures_left: Arc<Mutex<u32>>,
    }

    impl Muxer for FlakyMuxer {
        fn open(&mut self) -> Result<()> {
            self.inner.open()
        }

        fn create_next_stream(&mut self, params: &CodecParameters) -> Result<usize> {
            self.inner.create_next_stream(params)
        }

        fn ready(&mut self) -> Result<()> {
            self.inner.ready()
        }

        fn write_packet(
            &mut self,
            packet: &Packet,
            input_time_base: TimeBase,
            output_stream_index: usize,
        ) -> Result<()> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(MediaError::Library(-5));
            }
            drop(left);
            self.inner
                .write_packet(packet, input_time_base, output_stream_index)
        }

        fn stream(&self, index: usize) -> Option<&StreamDescriptor> {
            self.inner.stream(index)
        }

        fn stream_mut(&mut self, index: usize) -> Option<&mut StreamDescriptor> {
            self.inner.stream_mut(index)
        }

        fn num_streams(&self) -> usize {
            self.inner.num_streams()
        }

        fn state(&self) -> mux::MuxerState {
            self.inner.state()
        }

        fn close(&mut self) -> Result<()> {
            self.inner.close()
        }

        fn fail(&mut self) {
            self.inner.fail()
        }
    }

    fn flaky_remuxer(failures: u32) -> (Remuxer, Arc<Mutex<MuxerLog>>, Arc<Mutex<u32>>) {
        let (inner, log) = MockMuxer::recording();
        let failures_left = Arc::new(Mutex::new(failures));
        let muxer = FlakyMuxer {
            inner,
            failures_left: failures_left.clone(),
        };
        (Remuxer::new(Box::new(muxer)), log, failures_left)
    }

    #[test]
    fn tolerates_a_bounded_run_of_failures() {
        let (mut remuxer, log, _) = flaky_remuxer(DEFAULT_MAX_REMUX_ERRORS);
        remuxer.setup(&source(), &[true, false, false]).unwrap();
        remuxer.pre_first_packet().unwrap();

        // exactly the tolerated number of failures, then a success
        for i in 0..=DEFAULT_MAX_REMUX_ERRORS {
            remuxer
                .handle_packet(&packet(0, i as i64 * 3000), MediaKind::Video)
                .unwrap();
        }
        remuxer.close().unwrap();
        assert_eq!(log.lock().unwrap().packets.len(), 1);
    }

    #[test]
    fn aborts_past_the_error_tolerance() {
        let (mut remuxer, _log, _) = flaky_remuxer(DEFAULT_MAX_REMUX_ERRORS + 1);
        remuxer.setup(&source(), &[true, false, false]).unwrap();
        remuxer.pre_first_packet().unwrap();

        for i in 0..DEFAULT_MAX_REMUX_ERRORS {
            remuxer
                .handle_packet(&packet(0, i as i64 * 3000), MediaKind::Video)
                .unwrap();
        }
        let err = remuxer
            .handle_packet(&packet(0, 90_000), MediaKind::Video)
            .unwrap_err();
        assert_eq!(err, MediaError::Library(-5));
    }

    #[test]
    fn success_resets_the_failure_run() {
        let (mut remuxer, log, failures_left) = flaky_remuxer(DEFAULT_MAX_REMUX_ERRORS);
        remuxer.setup(&source(), &[true, false, false]).unwrap();
        remuxer.pre_first_packet().unwrap();

        for i in 0..DEFAULT_MAX_REMUX_ERRORS {
            remuxer
                .handle_packet(&packet(0, i as i64 * 3000), MediaKind::Video)
                .unwrap();
        }
        // one success clears the run
        remuxer.handle_packet(&packet(0, 90_000), MediaKind::Video).unwrap();
        // a fresh run of the same length is tolerated again
        *failures_left.lock().unwrap() = DEFAULT_MAX_REMUX_ERRORS;
        for i in 0..DEFAULT_MAX_REMUX_ERRORS {
            remuxer
                .handle_packet(&packet(0, 100_000 + i as i64 * 3000), MediaKind::Video)
                .unwrap();
        }
        remuxer.close().unwrap();
        assert_eq!(log.lock().unwrap().packets.len(), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let (mut remuxer, log) = recording_remuxer();
        remuxer.setup(&source(), &[true, true, false]).unwrap();
        remuxer.close().unwrap();
        remuxer.close().unwrap();
        assert!(log.lock().unwrap().closed);
    }

    #[test]
    fn writes_an_flv_file_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.flv");
        let mut remuxer = Remuxer::to_uri(&path).unwrap();
        remuxer.setup(&source(), &[true, true, false]).unwrap();
        remuxer.pre_first_packet().unwrap();

        let mut key = packet(0, 0);
        key.keyframe = true;
        remuxer.handle_packet(&key, MediaKind::Video).unwrap();
        remuxer.handle_packet(&packet(1, 0), MediaKind::Audio).unwrap();
        remuxer.handle_packet(&packet(0, 3000), MediaKind::Video).unwrap();
        remuxer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..3], b"FLV");
        assert_eq!(bytes[4], 0x05);
        assert!(bytes.len() > 13);
    }
}
