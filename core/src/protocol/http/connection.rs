/*
 * connection.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Corriere, an asynchronous HTTP client engine.
 *
 * Corriere is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Corriere is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Corriere.  If not, see <http://www.gnu.org/licenses/>.
 */

//! TCP transport: one I/O task per connection owns a plain or TLS stream, writes
//! queued requests, and drives the H1 parser into transport events.

use std::collections::VecDeque;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::client::TlsStream as TokioTlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

use crate::net;
use crate::pool::EndpointKey;
use crate::protocol::http::h1::{BodyMode, H1ResponseHandler, ParseState, ResponseParser};
use crate::protocol::http::headers::{names, Headers};
use crate::protocol::http::request::Method;
use crate::protocol::http::response::{BodyPart, HttpVersion, ResponseStatus};
use crate::protocol::http::transport::{BoxFuture, Channel, OpenedChannel, Outbound, Transport, TransportEvent, WireRequest};

/// Unified stream: plain TCP or TLS. Implements AsyncRead + AsyncWrite.
pub enum HttpStream {
    Plain(TcpStream),
    Tls(TokioTlsStream<TcpStream>),
}

impl AsyncRead for HttpStream {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            HttpStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for HttpStream {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            HttpStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_flush(cx),
            HttpStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            HttpStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Opens TCP connections, with TLS for direct HTTPS endpoints.
pub struct TcpTransport {
    connector: TlsConnector,
    next_id: AtomicU64,
}

impl TcpTransport {
    pub fn new(accept_any_certificate: bool) -> io::Result<Self> {
        Ok(Self {
            connector: TlsConnector::from(net::http_client_config(accept_any_certificate)?),
            next_id: AtomicU64::new(1),
        })
    }
}

impl Transport for TcpTransport {
    fn open(&self, key: &EndpointKey) -> BoxFuture<'static, io::Result<OpenedChannel>> {
        let connector = self.connector.clone();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let key = key.clone();
        Box::pin(async move {
            let (host, port) = key.connect_address();
            let tcp = TcpStream::connect((host, port)).await?;
            tcp.set_nodelay(true)?;
            let remote = tcp.peer_addr().ok();
            let stream = if key.is_secure() && key.proxy().is_none() {
                HttpStream::Tls(net::upgrade_to_tls(&connector, tcp, key.host()).await?)
            } else {
                HttpStream::Plain(tcp)
            };
            debug!(id, endpoint = %key, "connected");

            let (commands_tx, commands_rx) = mpsc::unbounded_channel();
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let open = Arc::new(AtomicBool::new(true));
            tokio::spawn(run_connection(
                id,
                stream,
                connector,
                commands_rx,
                ResponseDecoder::new(events_tx, remote),
                Arc::clone(&open),
            ));
            Ok(OpenedChannel {
                channel: Arc::new(TcpChannel {
                    id,
                    commands: commands_tx,
                    open,
                    remote,
                }),
                events: events_rx,
            })
        })
    }
}

enum Command {
    Write(Outbound),
    UpgradeTls(String),
    Close,
}

/// Handle to a connection's I/O task.
struct TcpChannel {
    id: u64,
    commands: mpsc::UnboundedSender<Command>,
    open: Arc<AtomicBool>,
    remote: Option<SocketAddr>,
}

impl TcpChannel {
    fn send(&self, command: Command) -> io::Result<()> {
        if !self.is_open() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }
        self.commands
            .send(command)
            .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "connection closed"))
    }
}

impl Channel for TcpChannel {
    fn id(&self) -> u64 {
        self.id
    }

    fn write(&self, message: Outbound) -> io::Result<()> {
        self.send(Command::Write(message))
    }

    fn upgrade_to_tls(&self, host: &str) -> io::Result<()> {
        self.send(Command::UpgradeTls(host.to_string()))
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.commands.send(Command::Close);
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }
}

async fn run_connection(
    id: u64,
    mut stream: HttpStream,
    connector: TlsConnector,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut decoder: ResponseDecoder,
    open: Arc<AtomicBool>,
) {
    let mut read_buf = BytesMut::with_capacity(8192);
    // body framing of the request whose body may still be released
    let mut chunked_body = false;
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                None | Some(Command::Close) => break,
                Some(Command::Write(message)) => {
                    let encoded = match &message {
                        Outbound::Request(request) => {
                            chunked_body = is_chunked(&request.headers);
                            decoder.request_sent(request.method);
                            encode_request(request)
                        }
                        Outbound::Body(body) => encode_body(body, chunked_body),
                    };
                    let written = async {
                        stream.write_all(&encoded).await?;
                        stream.flush().await
                    };
                    if let Err(e) = written.await {
                        decoder.emit(TransportEvent::Error(e));
                        break;
                    }
                }
                Some(Command::UpgradeTls(host)) => {
                    stream = match stream {
                        HttpStream::Plain(tcp) => match net::upgrade_to_tls(&connector, tcp, &host).await {
                            Ok(tls) => HttpStream::Tls(tls),
                            Err(e) => {
                                decoder.emit(TransportEvent::UpgradeFailed(e));
                                break;
                            }
                        },
                        HttpStream::Tls(_) => {
                            decoder.emit(TransportEvent::UpgradeFailed(io::Error::new(
                                io::ErrorKind::Unsupported,
                                "connection is already TLS",
                            )));
                            break;
                        }
                    };
                    trace!(id, host = %host, "tunnel upgraded to TLS");
                }
            },
            read = stream.read_buf(&mut read_buf) => match read {
                Ok(0) => {
                    decoder.end_of_input();
                    decoder.emit(TransportEvent::Closed);
                    break;
                }
                Ok(_) => {
                    if let Err(e) = decoder.decode(&mut read_buf) {
                        decoder.emit(TransportEvent::Error(e));
                        break;
                    }
                }
                Err(e) => {
                    decoder.emit(TransportEvent::Error(e));
                    break;
                }
            },
        }
    }
    open.store(false, Ordering::Release);
    trace!(id, "connection task finished");
}

fn is_chunked(headers: &Headers) -> bool {
    headers.contains_token(names::TRANSFER_ENCODING, "chunked")
}

/// Serialize a request head, and its body unless withheld.
pub fn encode_request(request: &WireRequest) -> BytesMut {
    let mut head = format!("{} {} HTTP/1.1\r\n", request.method.as_str(), request.target);
    for (name, value) in request.headers.iter() {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    if request.method != Method::Connect && !request.headers.contains(names::CONNECTION) {
        head.push_str("Connection: keep-alive\r\n");
    }
    head.push_str("\r\n");
    let mut out = BytesMut::from(head.as_bytes());
    if let Some(body) = &request.body {
        out.extend_from_slice(&encode_body(body, is_chunked(&request.headers)));
    }
    out
}

/// Serialize a body, as a single chunk plus terminator when chunked.
pub fn encode_body(body: &Bytes, chunked: bool) -> BytesMut {
    let mut out = BytesMut::with_capacity(body.len() + 16);
    if chunked {
        if !body.is_empty() {
            out.extend_from_slice(format!("{:x}\r\n", body.len()).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"0\r\n\r\n");
    } else {
        out.extend_from_slice(body);
    }
    out
}

/// Bridges H1 parser callbacks to transport events.
struct EventSink {
    events: mpsc::UnboundedSender<TransportEvent>,
    remote: Option<SocketAddr>,
    status: Option<ResponseStatus>,
    headers: Headers,
    trailers: Headers,
}

impl EventSink {
    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }
}

impl H1ResponseHandler for EventSink {
    fn status(&mut self, version: HttpVersion, code: u16, reason: Option<&str>) {
        self.status = Some(ResponseStatus {
            version,
            code,
            reason: reason.map(str::to_string),
            remote_addr: self.remote,
        });
        self.headers = Headers::new();
        self.trailers = Headers::new();
    }

    fn header(&mut self, name: &str, value: &str) {
        self.headers.add(name, value);
    }

    fn body_chunk(&mut self, data: &[u8]) {
        self.emit(TransportEvent::Body(BodyPart::new(Bytes::copy_from_slice(data), false)));
    }

    fn trailer(&mut self, name: &str, value: &str) {
        self.trailers.add(name, value);
    }

    fn end_body(&mut self) {
        if self.trailers.is_empty() {
            self.emit(TransportEvent::Body(BodyPart::end()));
        } else {
            let trailers = mem::take(&mut self.trailers);
            self.emit(TransportEvent::Trailers(trailers));
        }
    }
}

/// Response side of one connection: methods of requests in flight and the parser.
struct ResponseDecoder {
    parser: ResponseParser,
    sink: EventSink,
    pending: VecDeque<Method>,
}

impl ResponseDecoder {
    fn new(events: mpsc::UnboundedSender<TransportEvent>, remote: Option<SocketAddr>) -> Self {
        Self {
            parser: ResponseParser::new(),
            sink: EventSink {
                events,
                remote,
                status: None,
                headers: Headers::new(),
                trailers: Headers::new(),
            },
            pending: VecDeque::new(),
        }
    }

    fn request_sent(&mut self, method: Method) {
        self.pending.push_back(method);
    }

    fn emit(&self, event: TransportEvent) {
        self.sink.emit(event);
    }

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<()> {
        loop {
            self.parser.receive(buf, &mut self.sink)?;
            match self.parser.state() {
                ParseState::HeadersComplete => self.headers_complete()?,
                ParseState::Idle => self.parser.reset(),
                _ => return Ok(()),
            }
        }
    }

    fn headers_complete(&mut self) -> io::Result<()> {
        let status = self
            .sink
            .status
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "headers without status line"))?;
        let headers = mem::take(&mut self.sink.headers);
        let code = status.code;
        let content_length = headers
            .get(names::CONTENT_LENGTH)
            .and_then(|v| v.trim().parse::<u64>().ok());
        let chunked = is_chunked(&headers);
        let success = status.is_success();
        self.emit(TransportEvent::Status(status));
        self.emit(TransportEvent::Headers(headers));

        if (100..200).contains(&code) {
            self.parser.reset();
            return Ok(());
        }
        let method = self.pending.pop_front();
        if method == Some(Method::Connect) && success {
            // tunnel established; no body follows
            self.parser.reset();
            return Ok(());
        }
        let mode = BodyMode::for_response(method == Some(Method::Head), code, content_length, chunked);
        self.parser.set_body_mode(mode, &mut self.sink);
        Ok(())
    }

    fn end_of_input(&mut self) {
        self.parser.end_of_input(&mut self.sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> (ResponseDecoder, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ResponseDecoder::new(tx, None), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> Vec<TransportEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn interim_then_final_response() {
        let (mut d, mut rx) = decoder();
        d.request_sent(Method::Post);
        let mut buf = BytesMut::from(&b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 2\r\n\r\nok"[..]);
        d.decode(&mut buf).unwrap();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 6);
        assert!(matches!(&events[0], TransportEvent::Status(s) if s.code == 100));
        assert!(matches!(&events[1], TransportEvent::Headers(h) if h.is_empty()));
        assert!(matches!(&events[2], TransportEvent::Status(s) if s.code == 201));
        assert!(matches!(&events[3], TransportEvent::Headers(h) if h.get("content-length") == Some("2")));
        assert!(matches!(&events[4], TransportEvent::Body(b) if !b.last && &b.data[..] == b"ok"));
        assert!(matches!(&events[5], TransportEvent::Body(b) if b.last && b.data.is_empty()));
    }

    #[test]
    fn head_response_has_no_body() {
        let (mut d, mut rx) = decoder();
        d.request_sent(Method::Head);
        d.request_sent(Method::Get);
        let mut buf = BytesMut::from(
            &b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nx"[..],
        );
        d.decode(&mut buf).unwrap();
        let events = drain(&mut rx);
        let terminals = events
            .iter()
            .filter(|e| matches!(e, TransportEvent::Body(b) if b.last))
            .count();
        assert_eq!(terminals, 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn connect_success_has_no_body_events() {
        let (mut d, mut rx) = decoder();
        d.request_sent(Method::Connect);
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 Connection established\r\n\r\n"[..]);
        d.decode(&mut buf).unwrap();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(d.parser.state(), ParseState::StatusLine);
    }

    #[test]
    fn chunked_trailers_terminate() {
        let (mut d, mut rx) = decoder();
        d.request_sent(Method::Get);
        let mut buf = BytesMut::from(
            &b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n1\r\na\r\n0\r\nX-Check: 1\r\n\r\n"[..],
        );
        d.decode(&mut buf).unwrap();
        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(TransportEvent::Trailers(t)) if t.get("x-check") == Some("1")));
    }

    #[test]
    fn close_delimited_body_ends_on_eof() {
        let (mut d, mut rx) = decoder();
        d.request_sent(Method::Get);
        let mut buf = BytesMut::from(&b"HTTP/1.0 200 OK\r\n\r\nabc"[..]);
        d.decode(&mut buf).unwrap();
        d.end_of_input();
        let events = drain(&mut rx);
        assert!(matches!(&events[0], TransportEvent::Status(s) if s.version == HttpVersion::Http1_0));
        assert!(matches!(events.last(), Some(TransportEvent::Body(b)) if b.last));
    }

    #[test]
    fn request_encoding() {
        let mut headers = Headers::new();
        headers.set("Host", "example.com");
        headers.set("Content-Length", "2");
        let encoded = encode_request(&WireRequest {
            method: Method::Post,
            target: "/a?b=1".into(),
            headers,
            body: Some(Bytes::from_static(b"hi")),
        });
        assert_eq!(
            &encoded[..],
            b"POST /a?b=1 HTTP/1.1\r\nHost: example.com\r\nContent-Length: 2\r\nConnection: keep-alive\r\n\r\nhi"
        );
        assert_eq!(&encode_body(&Bytes::from_static(b"hello"), true)[..], b"5\r\nhello\r\n0\r\n\r\n");
    }
}
