use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, trace};

use crate::codec::{RequestEncoder, ResponseDecoder};
use crate::config::{ClientConfig, DEFAULT_MAX_RESPONSE_BODY};
use crate::protocol::{
    ClientResponse, ConnectionFailure, Message, ParseError, PayloadItem, PayloadSize, RequestDescriptor, ResponseHead,
    is_keep_alive,
};

/// Drives HTTP/1.1 exchanges over a reader and a writer.
///
/// One exchange is in flight at a time: [`HttpConnection::exchange`] writes a request and
/// reads its response to the end before it returns, so the connection is positioned at
/// the next response head afterwards.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
#[derive(Debug)]
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, ResponseDecoder>,
    framed_write: FramedWrite<W, RequestEncoder>,
    response_timeout: Option<Duration>,
    max_response_body: u64,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, ResponseDecoder::new(), 8 * 1024),
            framed_write: FramedWrite::new(writer, RequestEncoder::new()),
            response_timeout: None,
            max_response_body: DEFAULT_MAX_RESPONSE_BODY,
        }
    }

    pub fn with_config(reader: R, writer: W, config: &ClientConfig) -> Self {
        let encoder = match config.user_agent() {
            Some(user_agent) => RequestEncoder::with_user_agent(user_agent.clone()),
            None => RequestEncoder::new(),
        };

        Self {
            framed_read: FramedRead::with_capacity(reader, ResponseDecoder::new(), config.read_buffer_capacity()),
            framed_write: FramedWrite::new(writer, encoder),
            response_timeout: config.response_timeout(),
            max_response_body: config.max_response_body(),
        }
    }

    /// Writes `request` and reads its complete response.
    ///
    /// The returned flag tells whether the connection can carry another exchange.
    pub async fn exchange(&mut self, request: &RequestDescriptor) -> Result<(ClientResponse, bool), ConnectionFailure> {
        self.send_request(request).await?;
        self.receive_response().await
    }

    /// Writes and flushes `request`.
    pub async fn send_request(&mut self, request: &RequestDescriptor) -> Result<(), ConnectionFailure> {
        let (head, body) = request.to_head();
        let payload_size = if request.need_body() { PayloadSize::new_length(body.len() as u64) } else { PayloadSize::new_empty() };

        self.framed_read.decoder_mut().expect_response_to(request.method().clone());

        self.framed_write.feed(Message::<_, Bytes>::Header((head, payload_size))).await?;
        if !body.is_empty() {
            self.framed_write.feed(Message::Payload(PayloadItem::Chunk(body))).await?;
        }
        self.framed_write.send(Message::Payload(PayloadItem::<Bytes>::Eof)).await?;

        trace!(method = %request.method(), uri = %request.uri(), "request sent");
        Ok(())
    }

    /// Reads the next final response, bounded by the configured response timeout.
    pub async fn receive_response(&mut self) -> Result<(ClientResponse, bool), ConnectionFailure> {
        match self.response_timeout {
            Some(timeout) => {
                tokio::time::timeout(timeout, self.read_response()).await.map_err(|_| ConnectionFailure::timeout("awaiting the response"))?
            }
            None => self.read_response().await,
        }
    }

    async fn read_response(&mut self) -> Result<(ClientResponse, bool), ConnectionFailure> {
        let (head, payload_size) = loop {
            let (head, payload_size) = self.read_head().await?;
            // interim responses precede the final one and carry no body
            if head.status().is_informational() && head.status() != StatusCode::SWITCHING_PROTOCOLS {
                debug!(status = %head.status(), "skip interim response");
                self.read_body(payload_size).await?;
                continue;
            }
            break (head, payload_size);
        };

        let body = self.read_body(payload_size).await?;
        let keep_alive =
            is_keep_alive(&head) && !payload_size.is_until_close() && head.status() != StatusCode::SWITCHING_PROTOCOLS;

        Ok((head.map(|()| body), keep_alive))
    }

    async fn read_head(&mut self) -> Result<(ResponseHead, PayloadSize), ConnectionFailure> {
        match self.framed_read.next().await {
            Some(Ok(Message::Header(header))) => Ok(header),

            Some(Ok(Message::Payload(_))) => {
                error!("receive payload while expecting a response head");
                Err(ParseError::invalid_body("need response head while receive body").into())
            }

            Some(Err(e)) => {
                error!(cause = %e, "can't decode response head");
                Err(e.into())
            }

            None => {
                debug!("peer closed before sending a response");
                Err(ConnectionFailure::Closed)
            }
        }
    }

    async fn read_body(&mut self, payload_size: PayloadSize) -> Result<Bytes, ConnectionFailure> {
        let mut body = match payload_size {
            PayloadSize::Length(length) if length > self.max_response_body => {
                error!(content_length = length, limit = self.max_response_body, "response body exceeds the limit");
                return Err(ParseError::too_large_body(length, self.max_response_body).into());
            }
            PayloadSize::Length(length) => BytesMut::with_capacity(usize::try_from(length).unwrap_or(0).min(1024 * 1024)),
            _ => BytesMut::new(),
        };

        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                    let size = (body.len() + bytes.len()) as u64;
                    if size > self.max_response_body {
                        error!(size, limit = self.max_response_body, "response body exceeds the limit");
                        return Err(ParseError::too_large_body(size, self.max_response_body).into());
                    }
                    body.extend_from_slice(&bytes);
                }

                Some(Ok(Message::Payload(PayloadItem::Eof))) => return Ok(body.freeze()),

                Some(Ok(Message::Header(_))) => {
                    error!("receive response head while reading a body");
                    return Err(ParseError::invalid_body("need body while receive response head").into());
                }

                Some(Err(e)) => {
                    error!(cause = %e, "can't decode response body");
                    return Err(e.into());
                }

                None => return Err(ConnectionFailure::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;
    use http::{Method, Uri, Version};
    use indoc::indoc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex, split};

    fn crlf(text: &str) -> String {
        text.replace('\n', "\r\n")
    }

    #[tokio::test]
    async fn get_with_length_body() {
        let (client, mut server) = duplex(4096);
        let (reader, writer) = split(client);
        let mut connection = HttpConnection::new(reader, writer);

        server
            .write_all(crlf(indoc! {"
            HTTP/1.1 200 OK
            Content-Length: 2

            OK"})
            .as_bytes())
            .await
            .unwrap();

        let request = RequestDescriptor::get(Uri::from_static("http://localhost/status"));
        let (response, keep_alive) = connection.exchange(&request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.version(), Version::HTTP_11);
        assert_eq!(response.body(), &Bytes::from_static(b"OK"));
        assert!(keep_alive);

        let mut written = vec![0u8; 256];
        let n = server.read(&mut written).await.unwrap();
        assert_eq!(&written[..n], b"GET /status HTTP/1.1\r\nhost: localhost\r\n\r\n");
    }

    #[tokio::test]
    async fn post_body_and_chunked_response() {
        let (client, mut server) = duplex(4096);
        let (reader, writer) = split(client);
        let config = ClientConfig::builder().user_agent("micro-test").build().unwrap();
        let mut connection = HttpConnection::with_config(reader, writer, &config);

        server
            .write_all(crlf("HTTP/1.1 201 Created\nTransfer-Encoding: chunked\n\n3\nabc\n2\nde\n0\n\n").as_bytes())
            .await
            .unwrap();

        let request = RequestDescriptor::post(Uri::from_static("http://localhost:8080/items"), "name=widget");
        let (response, keep_alive) = connection.exchange(&request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.body(), &Bytes::from_static(b"abcde"));
        assert!(keep_alive);

        let mut written = vec![0u8; 512];
        let n = server.read(&mut written).await.unwrap();
        let written = String::from_utf8_lossy(&written[..n]);
        assert!(written.starts_with("POST /items HTTP/1.1\r\n"));
        assert!(written.contains("host: localhost:8080\r\n"));
        assert!(written.contains("user-agent: micro-test\r\n"));
        assert!(written.contains("content-length: 11\r\n"));
        assert!(written.ends_with("\r\n\r\nname=widget"));
    }

    #[tokio::test]
    async fn skips_interim_responses() {
        let (client, mut server) = duplex(4096);
        let (reader, writer) = split(client);
        let mut connection = HttpConnection::new(reader, writer);

        server
            .write_all(crlf("HTTP/1.1 100 Continue\n\nHTTP/1.1 204 No Content\n\n").as_bytes())
            .await
            .unwrap();

        let request = RequestDescriptor::put(Uri::from_static("http://localhost/items/1"), "x");
        let (response, keep_alive) = connection.exchange(&request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.body().is_empty());
        assert!(keep_alive);
    }

    #[tokio::test]
    async fn head_response_then_next_exchange() {
        let (client, mut server) = duplex(4096);
        let (reader, writer) = split(client);
        let mut connection = HttpConnection::new(reader, writer);

        server
            .write_all(crlf("HTTP/1.1 200 OK\nContent-Length: 5\n\nHTTP/1.1 200 OK\nContent-Length: 5\n\nhello").as_bytes())
            .await
            .unwrap();

        let (first, _) = connection.exchange(&RequestDescriptor::head(Uri::from_static("http://localhost/"))).await.unwrap();
        assert_eq!(first.headers().get(header::CONTENT_LENGTH).unwrap(), "5");
        assert!(first.body().is_empty());

        let (second, _) = connection.exchange(&RequestDescriptor::get(Uri::from_static("http://localhost/"))).await.unwrap();
        assert_eq!(second.body(), &Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn close_delimited_body_is_not_reusable() {
        let (client, mut server) = duplex(4096);
        let (reader, writer) = split(client);
        let mut connection = HttpConnection::new(reader, writer);

        server.write_all(crlf("HTTP/1.0 200 OK\n\nlegacy body").as_bytes()).await.unwrap();
        server.shutdown().await.unwrap();

        let request = RequestDescriptor::new(Method::GET, Uri::from_static("http://localhost/"), Bytes::new());
        let (response, keep_alive) = connection.exchange(&request).await.unwrap();
        assert_eq!(response.body(), &Bytes::from_static(b"legacy body"));
        assert!(!keep_alive);
    }

    #[tokio::test]
    async fn connection_close_header() {
        let (client, mut server) = duplex(4096);
        let (reader, writer) = split(client);
        let mut connection = HttpConnection::new(reader, writer);

        server.write_all(crlf("HTTP/1.1 200 OK\nConnection: close\nContent-Length: 0\n\n").as_bytes()).await.unwrap();

        let (_, keep_alive) = connection.exchange(&RequestDescriptor::get(Uri::from_static("http://localhost/"))).await.unwrap();
        assert!(!keep_alive);
    }

    #[tokio::test]
    async fn peer_closes_early() {
        let (client, mut server) = duplex(4096);
        let (reader, writer) = split(client);
        let mut connection = HttpConnection::new(reader, writer);

        server.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort").await.unwrap();
        server.shutdown().await.unwrap();

        let failure = connection.exchange(&RequestDescriptor::get(Uri::from_static("http://localhost/"))).await.unwrap_err();
        assert!(matches!(failure, ConnectionFailure::Malformed { .. }));
    }

    #[tokio::test]
    async fn nothing_received_is_closed() {
        let (client, server) = duplex(4096);
        let (reader, writer) = split(client);
        let mut connection = HttpConnection::new(reader, writer);

        let request = RequestDescriptor::get(Uri::from_static("http://localhost/"));
        connection.send_request(&request).await.unwrap();
        drop(server);

        let failure = connection.receive_response().await.unwrap_err();
        assert!(matches!(failure, ConnectionFailure::Closed));
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let config = ClientConfig::builder().max_response_body(8).build().unwrap();
        let responses: [&[u8]; 3] = [
            b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n",
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n5\r\nworld\r\n",
            b"HTTP/1.0 200 OK\r\n\r\nan endless close delimited body",
        ];

        for bytes in responses {
            let (client, mut server) = duplex(4096);
            let (reader, writer) = split(client);
            let mut connection = HttpConnection::with_config(reader, writer, &config);
            server.write_all(bytes).await.unwrap();

            let failure = connection.exchange(&RequestDescriptor::get(Uri::from_static("http://localhost/"))).await.unwrap_err();
            assert!(matches!(failure, ConnectionFailure::Malformed { source: ParseError::TooLargeBody { max_size: 8, .. } }));
            assert_eq!(failure.code(), crate::protocol::code::MALFORMED_RESPONSE);
        }
    }

    #[tokio::test]
    async fn body_at_the_limit_is_accepted() {
        let (client, mut server) = duplex(4096);
        let (reader, writer) = split(client);
        let config = ClientConfig::builder().max_response_body(5).build().unwrap();
        let mut connection = HttpConnection::with_config(reader, writer, &config);

        server.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello").await.unwrap();

        let (response, _) = connection.exchange(&RequestDescriptor::get(Uri::from_static("http://localhost/"))).await.unwrap();
        assert_eq!(response.body(), &Bytes::from_static(b"hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn response_timeout() {
        let (client, _server) = duplex(4096);
        let (reader, writer) = split(client);
        let config = ClientConfig::builder().response_timeout(Duration::from_secs(5)).build().unwrap();
        let mut connection = HttpConnection::with_config(reader, writer, &config);

        let failure = connection.exchange(&RequestDescriptor::get(Uri::from_static("http://localhost/"))).await.unwrap_err();
        assert!(matches!(failure, ConnectionFailure::Timeout { .. }));
    }
}
