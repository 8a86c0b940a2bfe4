//! Leveled logging sink attached to an allocator.
//!
//! Allocators do not log through the global `log` facade: each instance
//! carries an optional [`log::Log`] implementation injected at construction,
//! and records are dispatched to it directly. Without a sink every call is a
//! no-op.

use alloc::sync::Arc;
use core::fmt;

use log::{Level, Log, Metadata, Record};

/// Optional log sink plus the record target of its owning allocator.
#[derive(Clone)]
pub struct ArenaLogger {
    sink: Option<Arc<dyn Log>>,
    target: &'static str,
}

impl ArenaLogger {
    pub fn new(sink: Option<Arc<dyn Log>>, target: &'static str) -> Self {
        Self { sink, target }
    }

    /// A logger that drops every record.
    pub const fn disabled(target: &'static str) -> Self {
        Self { sink: None, target }
    }

    /// Whether a sink is attached.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Debug, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Warn, args);
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Error, args);
    }

    fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        let Some(sink) = &self.sink else {
            return;
        };
        let metadata = Metadata::builder().level(level).target(self.target).build();
        if !sink.enabled(&metadata) {
            return;
        }
        sink.log(
            &Record::builder()
                .metadata(metadata)
                .args(args)
                .module_path_static(Some(module_path!()))
                .build(),
        );
    }
}

impl fmt::Debug for ArenaLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaLogger")
            .field("target", &self.target)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
