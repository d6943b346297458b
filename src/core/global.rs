use parking_lot::Mutex;
use crate::core::config::Config;
use crate::core::engine::SearchEngine;
use crate::core::error::{Error, ErrorKind, Result};

// Collaborators that predate explicit handles get one process-wide engine
// behind this facade; everything else threads a SearchEngine through.
static ENGINE: Mutex<Option<SearchEngine>> = Mutex::new(None);

/// Open the process-wide engine. Fails if one is already open.
pub fn open(config: Config) -> Result<()> {
    let mut slot = ENGINE.lock();
    if slot.is_some() {
        return Err(Error::new(ErrorKind::Invalid, "global engine already open"));
    }
    *slot = Some(SearchEngine::open(config)?);
    Ok(())
}

pub fn is_open() -> bool {
    ENGINE.lock().is_some()
}

/// Run `f` against the process-wide engine.
pub fn with<F, R>(f: F) -> Result<R>
where
    F: FnOnce(&mut SearchEngine) -> Result<R>,
{
    let mut slot = ENGINE.lock();
    match slot.as_mut() {
        Some(engine) => f(engine),
        None => Err(Error::new(ErrorKind::Invalid, "global engine not open")),
    }
}

/// Close the process-wide engine, syncing it first.
pub fn close() -> Result<()> {
    let engine = ENGINE.lock().take();
    match engine {
        Some(engine) => engine.close(),
        None => Err(Error::new(ErrorKind::Invalid, "global engine not open")),
    }
}
