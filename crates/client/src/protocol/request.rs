//! Client request description.
//!
//! A [`RequestDescriptor`] is the immutable description of what to send: method, absolute
//! target URI, headers and a fully buffered body. It exists before the request is scheduled
//! and is only ever read afterwards.

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri, Version};

/// Type alias for the head of an outgoing request, used by the request encoder.
pub type RequestHead = Request<()>;

/// Immutable description of one HTTP request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    inner: Request<Bytes>,
}

impl RequestDescriptor {
    /// A `GET` request for `uri` without headers or body.
    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri, Bytes::new())
    }

    /// A `POST` request for `uri` carrying `body`.
    pub fn post<B: Into<Bytes>>(uri: Uri, body: B) -> Self {
        Self::new(Method::POST, uri, body.into())
    }

    /// A `PUT` request for `uri` carrying `body`.
    pub fn put<B: Into<Bytes>>(uri: Uri, body: B) -> Self {
        Self::new(Method::PUT, uri, body.into())
    }

    /// A `DELETE` request for `uri`.
    pub fn delete(uri: Uri) -> Self {
        Self::new(Method::DELETE, uri, Bytes::new())
    }

    /// A `HEAD` request for `uri`.
    pub fn head(uri: Uri) -> Self {
        Self::new(Method::HEAD, uri, Bytes::new())
    }

    pub fn new(method: Method, uri: Uri, body: Bytes) -> Self {
        let mut inner = Request::new(body);
        *inner.method_mut() = method;
        *inner.uri_mut() = uri;
        Self { inner }
    }

    /// Returns a copy of this descriptor with one more header.
    ///
    /// Descriptors are immutable once handed to the client; this is the construction-time
    /// way of adding headers.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.inner.headers_mut().append(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn body(&self) -> &Bytes {
        self.inner.body()
    }

    /// Builds the head handed to the encoder. The body is shared, not copied.
    pub fn to_head(&self) -> (RequestHead, Bytes) {
        let mut head = Request::new(());
        *head.method_mut() = self.inner.method().clone();
        *head.uri_mut() = self.inner.uri().clone();
        *head.version_mut() = self.inner.version();
        *head.headers_mut() = self.inner.headers().clone();
        (head, self.inner.body().clone())
    }

    /// Determines whether this request carries a body that must be framed.
    ///
    /// Methods that conventionally carry a body always get a `content-length`, even
    /// when it is zero.
    pub fn need_body(&self) -> bool {
        !self.inner.body().is_empty() || matches!(self.method(), &Method::POST | &Method::PUT | &Method::PATCH)
    }

    pub fn into_inner(self) -> Request<Bytes> {
        self.inner
    }
}

impl From<Request<Bytes>> for RequestDescriptor {
    #[inline]
    fn from(inner: Request<Bytes>) -> Self {
        Self { inner }
    }
}

impl From<(Parts, Bytes)> for RequestDescriptor {
    #[inline]
    fn from((parts, body): (Parts, Bytes)) -> Self {
        Self { inner: Request::from_parts(parts, body) }
    }
}
