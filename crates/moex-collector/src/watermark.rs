//! Durable resumption cursor: the id of the last checkpointed trade

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::WatermarkError;
use crate::trade::{Trade, TradeId};

/// Last successfully checkpointed trade id. Empty means no trades seen yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watermark(Option<TradeId>);

impl Watermark {
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn at(trade_id: TradeId) -> Self {
        Self(Some(trade_id))
    }

    /// Parse a persisted value; blank text is the empty watermark
    pub fn parse(raw: &str) -> Self {
        Self(TradeId::new(raw))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn trade_id(&self) -> Option<&TradeId> {
        self.0.as_ref()
    }

    /// Text form, empty string for the empty watermark
    pub fn as_str(&self) -> &str {
        self.0.as_ref().map(TradeId::as_str).unwrap_or("")
    }

    /// True when a trade with this id is newer than the watermark
    pub fn admits(&self, trade_id: &TradeId) -> bool {
        match &self.0 {
            None => true,
            Some(mark) => trade_id > mark,
        }
    }

    /// Keep only trades newer than the watermark, preserving order, and
    /// compute the watermark that would follow a fully published batch.
    pub fn select_new(&self, trades: Vec<Trade>) -> (Vec<Trade>, Watermark) {
        let fresh: Vec<Trade> = trades
            .into_iter()
            .filter(|t| self.admits(&t.trade_id))
            .collect();
        let candidate = fresh
            .iter()
            .map(|t| &t.trade_id)
            .max()
            .cloned()
            .map(Watermark::at)
            .unwrap_or_else(|| self.clone());
        (fresh, candidate)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mechanical read/write of the watermark
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Load the persisted watermark. Missing storage is the empty watermark,
    /// not an error.
    async fn load(&self) -> Result<Watermark, WatermarkError>;

    /// Persist the watermark; failure must reach the caller
    async fn save(&self, watermark: &Watermark) -> Result<(), WatermarkError>;
}

/// Watermark kept in a single text file.
///
/// Saves go through `<path>.tmp` and a rename so a crash never leaves a
/// truncated file behind.
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn io_error(&self, source: std::io::Error) -> WatermarkError {
        WatermarkError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn load(&self) -> Result<Watermark, WatermarkError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Watermark::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Watermark::empty()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn save(&self, watermark: &Watermark) -> Result<(), WatermarkError> {
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, watermark.as_str())
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

/// Store held in process memory, for tests and dry runs
#[derive(Default)]
pub struct InMemoryWatermarkStore {
    value: Mutex<Option<String>>,
    fail_saves: Mutex<bool>,
}

impl InMemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(raw: &str) -> Self {
        let store = Self::default();
        *store.value.lock().unwrap_or_else(|e| e.into_inner()) = Some(raw.to_string());
        store
    }

    /// Make every following save fail
    pub fn fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    /// Raw persisted value, `None` if never saved
    pub fn persisted(&self) -> Option<String> {
        self.value.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl WatermarkStore for InMemoryWatermarkStore {
    async fn load(&self) -> Result<Watermark, WatermarkError> {
        Ok(self
            .persisted()
            .map(|raw| Watermark::parse(&raw))
            .unwrap_or_default())
    }

    async fn save(&self, watermark: &Watermark) -> Result<(), WatermarkError> {
        if *self.fail_saves.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(WatermarkError::Io {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "save disabled"),
            });
        }
        *self.value.lock().unwrap_or_else(|e| e.into_inner()) = Some(watermark.as_str().to_string());
        Ok(())
    }
}
