//! The `Taint` facade.
//!
//! This module is the boundary instrumented code calls. Sources declare
//! sensitive data with [`Taint::tag_source`], sinks ask [`Taint::query_sink`]
//! before data leaves the process, and [`Taint::report_sink`] records what
//! actually left.

use crate::{config::TaintConfig, sink::Sink, sink::SinkViolation, Result};

use std::sync::Arc;
use taintflow_audit::{AuditJournal, SinkEvent};
use taintflow_engine::{PropagationEngine, ThreadContext};
use taintflow_store::{
    ByteBuffer, Fd, FileTarget, HeapId, Location, ObjectKind, Register, ShadowKey, ShadowStore,
    Value,
};
use taintflow_tag::Tag;

use tracing::{debug, info, trace, warn};

/// Source/sink instrumentation facade over a shared propagation engine.
///
/// `Taint` is cheap to clone: clones share the shadow store and the audit
/// journal. Each mutator thread keeps its own [`ThreadContext`].
///
/// # Example
///
/// ```rust
/// use taintflow_core::{Sink, Taint, TaintConfig};
/// use taintflow_engine::ThreadContext;
/// use taintflow_store::{Location, Register};
/// use taintflow_tag::Tag;
///
/// let taint = Taint::new(TaintConfig::default())?;
/// let mut ctx = ThreadContext::new();
/// taint.engine().invoke(&mut ctx, "onLocationChanged", 2, &[])?;
///
/// taint.add_taint_value(&mut ctx, Register(0), 51.5_f64, Tag::LOCATION_GPS)?;
/// taint.engine().move_value(&mut ctx, Register(1), Register(0))?;
///
/// let tag = taint.query_sink(&ctx, Location::reg(1));
/// assert_eq!(Taint::describe_tag(tag), "Location (GPS)");
/// assert!(taint.check_sink(tag, &Sink::network()).is_err());
/// # Ok::<(), taintflow_core::TaintError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Taint {
    /// Configuration.
    config: TaintConfig,

    /// Propagation engine over the shared shadow store.
    engine: PropagationEngine,

    /// Sink audit journal, when enabled.
    journal: Option<AuditJournal>,
}

impl Taint {
    /// Creates a facade with a fresh shadow store.
    ///
    /// # Errors
    ///
    /// `TaintError::Config` if the configuration is invalid, or
    /// `TaintError::Audit` if the journal cannot be opened.
    pub fn new(config: TaintConfig) -> Result<Self> {
        config.validate()?;

        let store = ShadowStore::with_descriptor_limit(
            config.store.policy(),
            config.store.descriptor_limit,
        );
        let engine = PropagationEngine::with_config(Arc::new(store), config.engine);

        let journal = if config.audit.enabled {
            let journal = match &config.audit.path {
                Some(path) => AuditJournal::open(path)?,
                None => AuditJournal::temporary()?,
            };
            Some(journal)
        } else {
            None
        };

        info!(
            "Taint facade initialized: arrays={}, fields={}, audit={}",
            config.store.arrays,
            config.store.fields,
            journal.is_some()
        );

        Ok(Self {
            config,
            engine,
            journal,
        })
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &TaintConfig {
        &self.config
    }

    /// Returns the propagation engine, for instrumenting data movement.
    #[must_use]
    pub const fn engine(&self) -> &PropagationEngine {
        &self.engine
    }

    /// Returns the shared shadow store.
    #[must_use]
    pub fn store(&self) -> &ShadowStore {
        self.engine.store()
    }

    /// Returns the audit journal, if enabled.
    #[must_use]
    pub const fn journal(&self) -> Option<&AuditJournal> {
        self.journal.as_ref()
    }

    // ------------------------------------------------------------------
    // Sources and sinks
    // ------------------------------------------------------------------

    /// Merges caller-declared source bits into `location`.
    ///
    /// Returns `false` if the location does not resolve; the bits are then
    /// dropped.
    pub fn tag_source(
        &self,
        ctx: &mut ThreadContext,
        location: Location,
        bits: impl Into<Tag>,
    ) -> bool {
        let tag = bits.into();
        let applied = self.engine.merge_tag(ctx, location, tag);
        if applied {
            debug!("Source {} tagged {}", location, tag);
        } else {
            trace!("Source tag {} on unresolved {} dropped", tag, location);
        }
        applied
    }

    /// Returns the tag of `location` without modifying it.
    #[must_use]
    pub fn query_sink(&self, ctx: &ThreadContext, location: Location) -> Tag {
        self.engine.get_tag(ctx, location)
    }

    /// Renders a tag for people. Unknown bits render as a marker.
    #[must_use]
    pub fn describe_tag(tag: impl Into<Tag>) -> String {
        tag.into().describe()
    }

    /// Clears the tag of `location`.
    pub fn declassify(&self, ctx: &mut ThreadContext, location: Location) -> bool {
        self.engine.declassify(ctx, location)
    }

    /// Looks up a configured sink by name.
    #[must_use]
    pub fn sink(&self, name: &str) -> Option<&Sink> {
        self.config.sink(name)
    }

    /// Checks `tag` against `sink`.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkViolation`] if the tag carries a refused source.
    pub fn check_sink(&self, tag: Tag, sink: &Sink) -> std::result::Result<(), SinkViolation> {
        sink.check(tag)
    }

    /// Reports `payload` leaving through `sink` with `tag`.
    ///
    /// Clear data is ignored. Tainted data produces a `warn` event and, when
    /// the journal is enabled, an audit record. Returns the record id.
    ///
    /// # Errors
    ///
    /// `TaintError::Audit` if the journal write fails.
    pub fn report_sink(
        &self,
        tag: Tag,
        sink: &Sink,
        payload: &[u8],
        destination: Option<&str>,
    ) -> Result<Option<u64>> {
        if tag.is_clear() {
            return Ok(None);
        }

        let event = SinkEvent::new(
            sink.name.as_str(),
            tag,
            payload,
            destination.map(str::to_string),
            self.config.audit.preview_bytes,
        );
        warn!(
            "Tainted data reached sink '{}' ({}): {} bytes to {}, preview {:?}",
            sink.name,
            event.sources,
            event.payload_len,
            destination.unwrap_or("unknown destination"),
            event.preview
        );

        match &self.journal {
            Some(journal) => Ok(Some(journal.record(event)?)),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Typed helpers
    // ------------------------------------------------------------------

    /// Writes `value` into `reg` and tags it with `bits`.
    ///
    /// # Errors
    ///
    /// `TaintError::Engine` if there is no active frame or `reg` is out of
    /// range.
    pub fn add_taint_value<T: Into<Value>>(
        &self,
        ctx: &mut ThreadContext,
        reg: Register,
        value: T,
        bits: impl Into<Tag>,
    ) -> Result<()> {
        self.engine.const_value(ctx, reg, value.into())?;
        self.tag_source(ctx, Location::Slot(reg), bits);
        Ok(())
    }

    /// Returns the tag of a register.
    #[must_use]
    pub fn get_taint_value(&self, ctx: &ThreadContext, reg: Register) -> Tag {
        ctx.reg_tag(reg)
    }

    /// Merges `bits` into an array's tag, which covers every element.
    pub fn add_taint_array(&self, array: HeapId, bits: impl Into<Tag>) -> bool {
        self.merge_shared(ShadowKey::Array(array), bits.into())
    }

    /// Returns an array's tag.
    #[must_use]
    pub fn get_taint_array(&self, array: HeapId) -> Tag {
        self.store().get_tag(ShadowKey::Array(array))
    }

    /// Merges `bits` into the identity tag of a heap object.
    ///
    /// Arrays have no separate identity tag, so a reference to an array
    /// tags the array itself.
    pub fn add_taint_ref(&self, object: HeapId, bits: impl Into<Tag>) -> bool {
        self.merge_shared(self.identity_key(object), bits.into())
    }

    /// Returns the identity tag of a heap object.
    #[must_use]
    pub fn get_taint_ref(&self, object: HeapId) -> Tag {
        self.store().get_tag(self.identity_key(object))
    }

    /// Merges `bits` into a direct buffer. Heap-backed buffers are ignored.
    pub fn add_taint_buffer(&self, buffer: ByteBuffer, bits: impl Into<Tag>) -> bool {
        match buffer {
            ByteBuffer::Direct(id) => self.merge_shared(ShadowKey::Buffer(id), bits.into()),
            ByteBuffer::Heap(_) => {
                trace!("Ignoring taint on non-direct buffer");
                false
            }
        }
    }

    /// Returns a direct buffer's tag, or `None` for heap-backed buffers.
    #[must_use]
    pub fn get_taint_buffer(&self, buffer: ByteBuffer) -> Option<Tag> {
        match buffer {
            ByteBuffer::Direct(id) => Some(self.store().get_tag(ShadowKey::Buffer(id))),
            ByteBuffer::Heap(_) => None,
        }
    }

    /// Merges `bits` into an open descriptor.
    pub fn add_taint_file(&self, fd: Fd, bits: impl Into<Tag>) -> bool {
        self.merge_shared(ShadowKey::Descriptor(fd), bits.into())
    }

    /// Returns a descriptor's tag.
    #[must_use]
    pub fn get_taint_file(&self, fd: Fd) -> Tag {
        self.store().get_tag(ShadowKey::Descriptor(fd))
    }

    fn merge_shared(&self, key: ShadowKey, tag: Tag) -> bool {
        let applied = self.store().merge_tag(key, tag);
        if applied {
            debug!("Source {} tagged {}", Location::from(key), tag);
        } else {
            trace!("Source tag {} on unresolved {} dropped", tag, Location::from(key));
        }
        applied
    }

    fn identity_key(&self, object: HeapId) -> ShadowKey {
        match self.store().heap().kind_of(object) {
            Some(ObjectKind::Array(_)) => ShadowKey::Array(object),
            _ => ShadowKey::Object(object),
        }
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Emits a diagnostic message.
    pub fn log(&self, msg: &str) {
        info!(target: "taintflow::diag", "{}", msg);
    }

    /// Resolves `fd` to the path it was opened on and logs it.
    ///
    /// Returns `None` for closed descriptors and sockets.
    pub fn log_path_from_fd(&self, fd: Fd) -> Option<String> {
        let path = match self.store().descriptor_target(fd)? {
            target @ (FileTarget::Path(_) | FileTarget::Stdio(_)) => target.to_string(),
            FileTarget::Peer(_) => return None,
        };
        info!(target: "taintflow::diag", "{} -> {}", fd, path);
        Some(path)
    }

    /// Resolves `fd` to its remote peer address and logs it.
    ///
    /// Returns `None` for closed descriptors and non-socket descriptors.
    pub fn log_peer_from_fd(&self, fd: Fd) -> Option<String> {
        let peer = match self.store().descriptor_target(fd)? {
            FileTarget::Peer(addr) => addr.to_string(),
            FileTarget::Path(_) | FileTarget::Stdio(_) => return None,
        };
        info!(target: "taintflow::diag", "{} -> peer {}", fd, peer);
        Some(peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use taintflow_store::ElementKind;

    fn taint() -> Taint {
        Taint::new(TaintConfig::default()).unwrap()
    }

    fn ctx_with_frame(taint: &Taint, size: u16) -> ThreadContext {
        let mut ctx = ThreadContext::new();
        taint.engine().invoke(&mut ctx, "test", size, &[]).unwrap();
        ctx
    }

    // =========================================================================
    // Sources and sinks
    // =========================================================================

    #[test]
    fn test_tag_source_merges() {
        let taint = taint();
        let mut ctx = ctx_with_frame(&taint, 1);
        assert!(taint.tag_source(&mut ctx, Location::reg(0), Tag::CONTACTS));
        assert!(taint.tag_source(&mut ctx, Location::reg(0), 0x1_u32));
        assert_eq!(taint.query_sink(&ctx, Location::reg(0)), Tag::LOCATION | Tag::CONTACTS);
    }

    #[test]
    fn test_tag_source_on_unresolved_is_dropped() {
        let taint = taint();
        let mut ctx = ctx_with_frame(&taint, 1);
        assert!(!taint.tag_source(&mut ctx, Location::reg(7), Tag::MIC));
        assert!(!taint.tag_source(&mut ctx, Location::Object(HeapId(999)), Tag::MIC));
        assert_eq!(taint.query_sink(&ctx, Location::Object(HeapId(999))), Tag::CLEAR);
    }

    #[test]
    fn test_describe_tag_accepts_raw_bits() {
        assert_eq!(Taint::describe_tag(0_u32), "Clear");
        assert_eq!(Taint::describe_tag(0x204_u32), "Microphone, SMS");
    }

    #[test]
    fn test_report_clear_is_ignored() {
        let taint = taint();
        let id = taint.report_sink(Tag::CLEAR, &Sink::network(), b"hello", None).unwrap();
        assert_eq!(id, None);
    }

    #[test]
    fn test_report_without_journal_returns_none() {
        let taint = taint();
        let id = taint.report_sink(Tag::SMS, &Sink::network(), b"hello", None).unwrap();
        assert_eq!(id, None);
    }

    #[test]
    fn test_report_with_in_memory_journal() {
        let mut config = TaintConfig::default();
        config.audit = config.audit.with_enabled(true).with_preview_bytes(4);
        let taint = Taint::new(config).unwrap();

        let id = taint
            .report_sink(Tag::SMS, &Sink::network(), b"hello", Some("10.1.1.1:80"))
            .unwrap()
            .unwrap();
        let event = taint.journal().unwrap().get(id).unwrap().unwrap();
        assert_eq!(event.preview, "hell");
        assert!(event.truncated);
        assert_eq!(event.destination.as_deref(), Some("10.1.1.1:80"));
    }

    // =========================================================================
    // Typed helpers
    // =========================================================================

    #[test]
    fn test_add_taint_value_every_primitive() {
        let taint = taint();
        let mut ctx = ctx_with_frame(&taint, 8);
        taint.add_taint_value(&mut ctx, Register(0), true, Tag::LOCATION).unwrap();
        taint.add_taint_value(&mut ctx, Register(1), 7_i8, Tag::CONTACTS).unwrap();
        taint.add_taint_value(&mut ctx, Register(2), 0x41_u16, Tag::MIC).unwrap();
        taint.add_taint_value(&mut ctx, Register(3), 3_i16, Tag::PHONE_NUMBER).unwrap();
        taint.add_taint_value(&mut ctx, Register(4), 4_i32, Tag::CAMERA).unwrap();
        taint.add_taint_value(&mut ctx, Register(5), 5_i64, Tag::SMS).unwrap();
        taint.add_taint_value(&mut ctx, Register(6), 1.5_f32, Tag::IMEI).unwrap();
        taint.add_taint_value(&mut ctx, Register(7), 2.5_f64, Tag::PASSWORD).unwrap();

        assert_eq!(ctx.value(Register(2)), Some(Value::Char(0x41)));
        assert_eq!(taint.get_taint_value(&ctx, Register(0)), Tag::LOCATION);
        assert_eq!(taint.get_taint_value(&ctx, Register(7)), Tag::PASSWORD);
    }

    #[test]
    fn test_add_taint_value_without_frame_fails() {
        let taint = taint();
        let mut ctx = ThreadContext::new();
        assert!(taint.add_taint_value(&mut ctx, Register(0), 1_i32, Tag::SMS).is_err());
    }

    #[test]
    fn test_array_and_ref_helpers() {
        let taint = taint();
        let array = taint.store().alloc_array(ElementKind::BYTES, 4);
        let string = taint.store().alloc_string("secret");

        assert!(taint.add_taint_array(array, Tag::CAMERA));
        assert!(taint.add_taint_ref(string, Tag::PASSWORD));
        assert_eq!(taint.get_taint_array(array), Tag::CAMERA);
        assert_eq!(taint.get_taint_ref(string), Tag::PASSWORD);

        // A reference to an array reaches the array tag.
        assert!(taint.add_taint_ref(array, Tag::ACCOUNT));
        assert_eq!(taint.get_taint_array(array), Tag::CAMERA | Tag::ACCOUNT);
        assert_eq!(taint.get_taint_ref(array), Tag::CAMERA | Tag::ACCOUNT);
    }

    #[test]
    fn test_buffer_helpers() {
        let taint = taint();
        let direct = ByteBuffer::Direct(taint.store().alloc_direct_buffer(8));
        let heap = ByteBuffer::Heap(taint.store().alloc_array(ElementKind::BYTES, 8));

        assert!(taint.add_taint_buffer(direct, Tag::MIC));
        assert_eq!(taint.get_taint_buffer(direct), Some(Tag::MIC));

        assert!(!taint.add_taint_buffer(heap, Tag::MIC));
        assert_eq!(taint.get_taint_buffer(heap), None);
    }

    #[test]
    fn test_file_helpers() {
        let taint = taint();
        let fd = taint.store().open(FileTarget::Path("/data/contacts.db".into())).unwrap();
        assert!(taint.add_taint_file(fd, Tag::CONTACTS));
        assert_eq!(taint.get_taint_file(fd), Tag::CONTACTS);

        taint.store().close(fd).unwrap();
        assert_eq!(taint.get_taint_file(fd), Tag::CLEAR);
        assert!(!taint.add_taint_file(fd, Tag::CONTACTS));
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    #[test]
    fn test_log_path_and_peer() {
        let taint = taint();
        let addr: SocketAddr = "192.0.2.7:443".parse().unwrap();
        let file = taint.store().open(FileTarget::Path("/sdcard/out.txt".into())).unwrap();
        let sock = taint.store().open(FileTarget::Peer(addr)).unwrap();

        assert_eq!(taint.log_path_from_fd(file).as_deref(), Some("/sdcard/out.txt"));
        assert_eq!(taint.log_peer_from_fd(file), None);
        assert_eq!(taint.log_peer_from_fd(sock).as_deref(), Some("192.0.2.7:443"));
        assert_eq!(taint.log_path_from_fd(sock), None);
        assert_eq!(taint.log_path_from_fd(Fd(900)), None);

        taint.log("diagnostics ok");
    }
}
