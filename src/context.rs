
//! Progress reporting and block length checks,
//! shared by every stage of loading and saving.

use std::fmt::Display;
use log::{Level, Log, Metadata, Record};
use crate::io::{Read, Seek, Tracking};
use crate::error::{Error, UnitResult};


/// A logger that discards every message. Used when no logger is specified.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLog;

impl Log for NoLog {
    fn enabled(&self, _: &Metadata<'_>) -> bool { false }
    fn log(&self, _: &Record<'_>) {}
    fn flush(&self) {}
}

/// The logger used by `ReadOptions::default()`.
pub static NO_LOG: NoLog = NoLog;


/// Whether a file is currently being loaded or saved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action { Load, Save }

impl std::fmt::Display for Action {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(match self { Action::Load => "Load", Action::Save => "Save" })
    }
}


/// Reports the sections of a file to a logger,
/// and decides how strictly declared block lengths are enforced.
#[derive(Clone, Copy)]
pub struct Context<'l> {
    pub logger: &'l dyn Log,
    pub action: Action,

    /// Treat unread bytes at the end of a block as an error.
    pub pedantic: bool,
}

impl Default for Context<'static> {
    fn default() -> Self {
        Context { logger: &NO_LOG, action: Action::Load, pedantic: false }
    }
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("Context")
            .field("action", &self.action)
            .field("pedantic", &self.pedantic)
            .finish()
    }
}

impl<'l> Context<'l> {

    pub fn new(logger: &'l dyn Log, action: Action, pedantic: bool) -> Self {
        Context { logger, action, pedantic }
    }

    /// The same context, used for the opposite direction.
    pub fn with_action(self, action: Action) -> Self {
        Context { action, .. self }
    }

    fn emit(&self, level: Level, message: std::fmt::Arguments<'_>) {
        let metadata = Metadata::builder().level(level).target(module_path!()).build();

        if self.logger.enabled(&metadata) {
            self.logger.log(&Record::builder()
                .metadata(metadata)
                .module_path(Some(module_path!()))
                .args(message)
                .build()
            );
        }
    }

    /// Report that a section starts at this byte position.
    pub fn begin(&self, position: usize, section: impl Display) {
        self.emit(Level::Debug, format_args!("{}, {}, Begin, {}", position, self.action, section));
    }

    /// Report that a section ends at this byte position.
    pub fn end(&self, position: usize, section: impl Display) {
        self.emit(Level::Debug, format_args!("{}, {}, End, {}", position, self.action, section));
    }

    /// Report a problem that was repaired.
    pub fn warn(&self, position: usize, message: impl Display) {
        self.emit(Level::Warn, format_args!("{}, {}, Warning, {}", position, self.action, message));
    }

    /// Report a problem that was repaired outside of any byte stream.
    pub fn notice(&self, message: impl Display) {
        self.emit(Level::Warn, format_args!("{}, Warning, {}", self.action, message));
    }

    /// Move the reader to the declared end of a block.
    /// Reading past the end is always an error.
    /// Unread bytes are skipped with a warning, or are an error if pedantic.
    pub fn finish_block<R: Read + Seek>(&self, read: &mut Tracking<R>, end: usize, block: &'static str) -> UnitResult {
        let position = read.byte_position();

        if position > end {
            return Err(Error::invalid(format!("{} read past its declared end", block)));
        }

        if position < end {
            if self.pedantic {
                return Err(Error::invalid(format!("{} has {} unread bytes", block, end - position)));
            }

            self.warn(position, format_args!("skipping {} unread bytes in {}", end - position, block));
            read.seek_read_to(end)?;
        }

        Ok(())
    }
}
