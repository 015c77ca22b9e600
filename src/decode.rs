//! Cursor decoding into caller-owned containers.
//!
//! A store hands back a [`Cursor`] of encoded documents; [`decode`] drains it
//! into whatever sequence the caller declared. The element type comes from
//! the container, so the same cursor can be read as `Vec<User>`,
//! `Vec<serde_json::Value>` or a dynamically typed `serde_json::Value` array.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::RawDocument;

/// Server-side result stream.
///
/// Implementations must release their resources on `Drop` as well as on
/// [`Cursor::close`]: a deadline may drop a decode half-way through.
#[async_trait]
pub trait Cursor: Send {
    /// Move to the next document. Returns `false` once exhausted or faulted.
    async fn advance(&mut self) -> bool;

    /// The document the cursor is positioned on.
    fn current(&self) -> Option<&RawDocument>;

    /// Fault recorded while iterating, if any. Checked after exhaustion.
    fn take_error(&mut self) -> Option<Error>;

    async fn close(&mut self);
}

/// A container the decoder can fill.
pub trait DecodeTarget {
    type Item: DeserializeOwned;

    /// Fails with [`Error::InvalidTarget`] when the container does not
    /// currently hold a sequence.
    fn check(&self) -> Result<()>;

    /// Replace the container's contents in one step.
    fn replace(&mut self, items: Vec<Self::Item>);
}

impl<T: DeserializeOwned> DecodeTarget for Vec<T> {
    type Item = T;

    fn check(&self) -> Result<()> {
        Ok(())
    }

    fn replace(&mut self, items: Vec<T>) {
        *self = items;
    }
}

/// A dynamically typed target must already hold an array; its elements are
/// decoded as plain JSON values.
impl DecodeTarget for Value {
    type Item = Value;

    fn check(&self) -> Result<()> {
        match self {
            Value::Array(_) => Ok(()),
            other => Err(Error::InvalidTarget(format!(
                "target must be a sequence, but was {}",
                kind(other)
            ))),
        }
    }

    fn replace(&mut self, items: Vec<Value>) {
        *self = Value::Array(items);
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Drain `cursor` into `target`.
///
/// Fail-fast: the first document that does not decode aborts the call. The
/// target is only written once every document decoded and the cursor
/// reported no terminal error, so on failure it is left untouched. The
/// cursor is closed on every path.
pub async fn decode<T>(mut cursor: Box<dyn Cursor>, target: &mut T) -> Result<()>
where
    T: DecodeTarget + ?Sized,
{
    let result = drain(cursor.as_mut(), target).await;
    cursor.close().await;
    result
}

async fn drain<T>(cursor: &mut dyn Cursor, target: &mut T) -> Result<()>
where
    T: DecodeTarget + ?Sized,
{
    target.check()?;

    let mut items = Vec::new();
    while cursor.advance().await {
        let raw = cursor
            .current()
            .ok_or_else(|| Error::Cursor("cursor advanced without a document".to_string()))?;
        items.push(raw.decode::<T::Item>()?);
    }

    if let Some(err) = cursor.take_error() {
        return Err(err);
    }

    debug!(count = items.len(), "decoded cursor");
    target.replace(items);
    Ok(())
}

/// Decode only the first document of `cursor`.
pub async fn decode_one<T: DeserializeOwned>(mut cursor: Box<dyn Cursor>) -> Result<T> {
    let result = first(cursor.as_mut()).await;
    cursor.close().await;
    result
}

async fn first<T: DeserializeOwned>(cursor: &mut dyn Cursor) -> Result<T> {
    if cursor.advance().await {
        if let Some(raw) = cursor.current() {
            return raw.decode();
        }
    }
    match cursor.take_error() {
        Some(err) => Err(err),
        None => Err(Error::NoDocument),
    }
}

/// Cursor over documents already held in memory.
#[derive(Debug, Default)]
pub struct BufferedCursor {
    pending: VecDeque<RawDocument>,
    current: Option<RawDocument>,
    error: Option<Error>,
    closed: bool,
}

impl BufferedCursor {
    pub fn new(documents: impl IntoIterator<Item = RawDocument>) -> Self {
        Self {
            pending: documents.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Report `error` once the buffered documents run out.
    pub fn with_terminal_error(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl Cursor for BufferedCursor {
    async fn advance(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.current = self.pending.pop_front();
        self.current.is_some()
    }

    fn current(&self) -> Option<&RawDocument> {
        self.current.as_ref()
    }

    fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    async fn close(&mut self) {
        self.closed = true;
        self.pending.clear();
        self.current = None;
    }
}
