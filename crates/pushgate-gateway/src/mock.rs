//! Scripted connector for tests.
//!
//! Each call to `connect` pops the next [`ConnectStep`]; an empty script
//! yields a healthy stream. Every byte written through any stream lands in
//! one shared log so tests can decode what reached the "wire".

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use pushgate_core::codec::{decode_notification_frame, NotificationFrame};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::config::Endpoint;
use crate::error::{GatewayError, GatewayResult};
use crate::tls::Connector;

/// What one connect attempt does.
pub enum ConnectStep {
    Refuse,
    Open(StreamScript),
}

/// How an opened stream behaves.
#[derive(Debug, Clone, Default)]
pub struct StreamScript {
    /// Every write fails with a broken pipe.
    pub fail_writes: bool,
    /// Every write hangs forever.
    pub stall_writes: bool,
    /// Bytes served to readers, then EOF.
    pub read_data: Vec<u8>,
    /// Maximum bytes per read; 0 serves everything at once.
    pub read_chunk: usize,
    /// After `read_data` runs out, fail instead of returning EOF.
    pub read_error: bool,
}

impl StreamScript {
    pub fn broken() -> Self {
        StreamScript {
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn stalled() -> Self {
        StreamScript {
            stall_writes: true,
            ..Default::default()
        }
    }

    pub fn serving(data: impl Into<Vec<u8>>, read_chunk: usize) -> Self {
        StreamScript {
            read_data: data.into(),
            read_chunk,
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct Shared {
    script: Mutex<VecDeque<ConnectStep>>,
    written: Mutex<Vec<u8>>,
    connects: AtomicUsize,
    shutdowns: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MockConnector {
    shared: Arc<Shared>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(steps: impl IntoIterator<Item = ConnectStep>) -> Self {
        let connector = Self::new();
        connector.shared.script.lock().unwrap().extend(steps);
        connector
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shared.shutdowns.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<u8> {
        self.shared.written.lock().unwrap().clone()
    }

    /// Decodes every frame written so far.
    pub fn frames(&self) -> Vec<NotificationFrame> {
        let bytes = self.written();
        let mut frames = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let (frame, consumed) = decode_notification_frame(&bytes[offset..]).unwrap();
            frames.push(frame);
            offset += consumed;
        }
        frames
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Stream = MockStream;

    async fn connect(&self, endpoint: &Endpoint) -> GatewayResult<MockStream> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        let step = self.shared.script.lock().unwrap().pop_front();

        match step.unwrap_or(ConnectStep::Open(StreamScript::default())) {
            ConnectStep::Refuse => Err(GatewayError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                reason: "connection refused".into(),
            }),
            ConnectStep::Open(script) => Ok(MockStream {
                script,
                read_pos: 0,
                shared: self.shared.clone(),
            }),
        }
    }
}

pub struct MockStream {
    script: StreamScript,
    read_pos: usize,
    shared: Arc<Shared>,
}

impl AsyncRead for MockStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let remaining = &this.script.read_data[this.read_pos..];

        if remaining.is_empty() && this.script.read_error {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }

        let mut n = remaining.len().min(buf.remaining());
        if this.script.read_chunk > 0 {
            n = n.min(this.script.read_chunk);
        }
        buf.put_slice(&remaining[..n]);
        this.read_pos += n;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.script.stall_writes {
            return Poll::Pending;
        }
        if this.script.fail_writes {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        this.shared.written.lock().unwrap().extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shared.shutdowns.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}
