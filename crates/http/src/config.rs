//! Connection tuning knobs.
//!
//! A [`ConnectionConfig`] is built once per listener and shared by value
//! with every accepted connection. All sizes are in bytes.

/// Configuration for a single HTTP/1.x connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    input_buffer_size: usize,
    response_header_size: usize,
    max_header_bytes: usize,
    max_header_count: usize,
    send_server_version: bool,
    pool_retain_per_class: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            input_buffer_size: 8 * 1024,
            response_header_size: 4 * 1024,
            max_header_bytes: 8 * 1024,
            max_header_count: 64,
            send_server_version: false,
            pool_retain_per_class: 16,
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Default::default()
    }

    /// Size of the pooled buffer requests are filled into. When a request
    /// body is known to be larger than this, the refill path acquires a
    /// buffer of four times this size.
    pub fn input_buffer_size(mut self, size: usize) -> Self {
        self.input_buffer_size = size;
        self
    }

    /// Capacity of the buffer a response head is encoded into, whether it
    /// comes from the pool or is carved out of a content buffer's spare
    /// capacity.
    pub fn response_header_size(mut self, size: usize) -> Self {
        self.response_header_size = size;
        self
    }

    /// Upper bound on the byte length of a request head.
    pub fn max_header_bytes(mut self, max: usize) -> Self {
        self.max_header_bytes = max;
        self
    }

    /// Upper bound on the number of request header fields.
    pub fn max_header_count(mut self, max: usize) -> Self {
        self.max_header_count = max;
        self
    }

    /// Emit a `Server` header on responses that don't set one.
    pub fn send_server_version(mut self, enabled: bool) -> Self {
        self.send_server_version = enabled;
        self
    }

    /// How many released buffers each pool size class retains.
    pub fn pool_retain_per_class(mut self, retain: usize) -> Self {
        self.pool_retain_per_class = retain;
        self
    }

    pub fn get_input_buffer_size(&self) -> usize {
        self.input_buffer_size
    }

    pub fn get_response_header_size(&self) -> usize {
        self.response_header_size
    }

    pub fn get_max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    pub fn get_max_header_count(&self) -> usize {
        self.max_header_count
    }

    pub fn get_send_server_version(&self) -> bool {
        self.send_server_version
    }

    pub fn get_pool_retain_per_class(&self) -> usize {
        self.pool_retain_per_class
    }
}
