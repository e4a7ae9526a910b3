//! Duplex queue sitting directly on top of an `AsyncRead + AsyncWrite` stream.
//!
//! A [`SocketQueue`] owns two background workers: one drains an outbound channel, encodes each
//! message with the configured [`Codec`] and writes it to the stream; the other reads bytes off
//! the stream, extracts and decodes frames, and forwards them to an inbound channel. Framing
//! failures are fatal and close the queue; codec failures on an otherwise healthy stream are
//! reported but do not close it, mirroring the difference between a torn connection and a single
//! malformed message from an otherwise well-behaved peer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::codec::Codec;
use crate::core::error::{CodecError, Error};
use crate::core::message::WireMessage;
use crate::tasking::{Tasking, GROUP_DISPATCHER};

const BUFSIZE: usize = 4096;

/// One item pulled off the inbound side of a [`SocketQueue`].
#[derive(Debug)]
pub enum InboundEvent {
    Message(WireMessage),
    /// The frame boundary was fine but its payload failed to decode. The queue is still open.
    Recoverable(CodecError),
}

pub struct SocketQueue {
    outbound_tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<WireMessage>>>,
    inbound_rx: AsyncMutex<mpsc::UnboundedReceiver<InboundEvent>>,
    closed: Arc<AtomicBool>,
    close_reason: Arc<parking_lot::Mutex<Option<Arc<Error>>>>,
    close_notify: Arc<tokio::sync::Notify>,
}

impl SocketQueue {
    /// Spawns the reader/writer background workers over `reader`/`writer` via `tasking`.
    pub fn spawn<R, W>(
        reader: R,
        writer: W,
        codec: Arc<dyn Codec>,
        tasking: &Tasking,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<WireMessage>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<InboundEvent>();
        let closed = Arc::new(AtomicBool::new(false));
        let close_reason = Arc::new(parking_lot::Mutex::new(None));
        let close_notify = Arc::new(tokio::sync::Notify::new());

        tasking.spawn(
            GROUP_DISPATCHER,
            Self::sender_loop(writer, outbound_rx, codec.clone(), closed.clone()),
        );

        tasking.spawn(
            GROUP_DISPATCHER,
            Self::receiver_loop(
                reader,
                inbound_tx,
                codec,
                closed.clone(),
                close_reason.clone(),
                close_notify.clone(),
            ),
        );

        Self {
            outbound_tx: parking_lot::Mutex::new(Some(outbound_tx)),
            inbound_rx: AsyncMutex::new(inbound_rx),
            closed,
            close_reason,
            close_notify,
        }
    }

    /// Drains and writes every message already queued before exiting. The loop ends only once
    /// [`Self::close`] has dropped the outbound sender and the channel has been fully drained,
    /// so a response queued right before a handler-requested close still reaches the peer.
    async fn sender_loop<W: AsyncWrite + Unpin>(
        mut writer: W,
        mut rx: mpsc::UnboundedReceiver<WireMessage>,
        codec: Arc<dyn Codec>,
        closed: Arc<AtomicBool>,
    ) {
        while let Some(msg) = rx.recv().await {
            match codec.encode(&msg) {
                Ok(bytes) => {
                    if writer.write_all(&bytes).await.is_err() {
                        closed.store(true, Ordering::Release);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode outgoing message, closing socket queue");
                    closed.store(true, Ordering::Release);
                    break;
                }
            }
        }
        let _ = writer.shutdown().await;
    }

    async fn receiver_loop<R: AsyncRead + Unpin>(
        mut reader: R,
        tx: mpsc::UnboundedSender<InboundEvent>,
        codec: Arc<dyn Codec>,
        closed: Arc<AtomicBool>,
        close_reason: Arc<parking_lot::Mutex<Option<Arc<Error>>>>,
        close_notify: Arc<tokio::sync::Notify>,
    ) {
        let mut buf = BytesMut::with_capacity(BUFSIZE);
        let mut read_buf = vec![0u8; BUFSIZE];
        loop {
            loop {
                match codec.extract_frame(&mut buf) {
                    Ok(Some(frame)) => match codec.decode(&frame) {
                        Ok(msg) => {
                            let _ = tx.send(InboundEvent::Message(msg));
                        }
                        Err(e) => {
                            let _ = tx.send(InboundEvent::Recoverable(e));
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "framing error, closing socket queue");
                        *close_reason.lock() = Some(Arc::new(Error::Framing(e)));
                        closed.store(true, Ordering::Release);
                        return;
                    }
                }
            }

            tokio::select! {
                biased;
                _ = close_notify.notified() => {
                    closed.store(true, Ordering::Release);
                    return;
                }
                res = reader.read(&mut read_buf) => match res {
                    Ok(0) => {
                        closed.store(true, Ordering::Release);
                        return;
                    }
                    Ok(n) => buf.extend_from_slice(&read_buf[..n]),
                    Err(e) => {
                        *close_reason.lock() = Some(Arc::new(Error::Io(e)));
                        closed.store(true, Ordering::Release);
                        return;
                    }
                },
            }
        }
    }

    /// Enqueues `msg` for transmission. Non-blocking: the message is handed to the writer
    /// worker's channel and this returns immediately.
    pub fn put(&self, msg: WireMessage) -> Result<(), Error> {
        match self.outbound_tx.lock().as_ref() {
            Some(tx) => tx.send(msg).map_err(|_| Error::Closed),
            None => Err(Error::Closed),
        }
    }

    /// Waits for the next inbound event, or `None` once the stream has closed (EOF, I/O error,
    /// or a fatal framing error — see [`Self::close_reason`]).
    pub async fn get(&self) -> Option<InboundEvent> {
        self.inbound_rx.lock().await.recv().await
    }

    /// Idempotently closes this queue: drops the outbound sender so the sender worker flushes
    /// whatever is already queued and then exits, and wakes the receiver worker out of a blocked
    /// read so it stops and drops its inbound sender, which surfaces as `None` from
    /// [`Self::get`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.outbound_tx.lock().take();
        self.close_notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Why the queue stopped, if it closed due to a fatal error rather than a plain EOF or an
    /// explicit [`Self::close`] call.
    pub fn close_reason(&self) -> Option<Arc<Error>> {
        self.close_reason.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::core::message::{request, CallParams, ProtocolTag};
    use crate::core::options::ThreadingModel;
    use crate::framing::Rfc7464Framing;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_a_message_through_an_in_memory_duplex_stream() {
        let (client, server) = tokio::io::duplex(4096);
        let (client_r, client_w) = tokio::io::split(client);
        let (server_r, server_w) = tokio::io::split(server);

        let tasking = Tasking::new(ThreadingModel::Threads, Default::default());
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec::new(Rfc7464Framing));

        let client_q = SocketQueue::spawn(client_r, client_w, codec.clone(), &tasking);
        let server_q = SocketQueue::spawn(server_r, server_w, codec, &tasking);

        let envelope = request(ProtocolTag::Json, json!("id-1"), "ping", CallParams::None);
        client_q.put(WireMessage::Single(envelope.clone())).unwrap();

        match server_q.get().await.unwrap() {
            InboundEvent::Message(WireMessage::Single(got)) => assert_eq!(got, envelope),
            other => panic!("unexpected inbound event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn closing_one_end_surfaces_as_none_on_the_other() {
        let (client, server) = tokio::io::duplex(4096);
        let (client_r, client_w) = tokio::io::split(client);
        let (server_r, server_w) = tokio::io::split(server);

        let tasking = Tasking::new(ThreadingModel::Threads, Default::default());
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec::new(Rfc7464Framing));

        drop(SocketQueue::spawn(client_r, client_w, codec.clone(), &tasking));
        let server_q = SocketQueue::spawn(server_r, server_w, codec, &tasking);

        assert!(server_q.get().await.is_none());
    }
}
