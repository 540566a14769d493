use crate::{query, Version};
use std::{error, fmt, io};

#[derive(Debug, PartialEq)]
pub(crate) enum ErrorKind {
    InvalidMethod,

    InvalidUrl,
    #[allow(dead_code)]
    Query(query::Error),

    InvalidVersion,
    UnsupportedVersion,

    InvalidHeader,
    TooManyHeaders,
    InvalidContentLength,
    InvalidConnection,

    BodyTooLarge,
    #[allow(dead_code)]
    BodyMismatch {
        expected: usize,
        available: usize,
    },
    #[allow(dead_code)]
    UnexpectedBody(usize),

    ServiceUnavailable,
    Io(IoError),
}

macro_rules! http_errors {
    ($($name:ident: $status_code:expr, $len:literal => $msg:literal; )*) => {
        pub(crate) const fn as_http(&self, version: Version) -> &'static [u8] {
            match (self, version) { $(
                (Self::$name { .. }, Version::Http11) => concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: ", $len, "\r\n",
                    "content-type: text/plain\r\n",
                    "\r\n",
                    $msg
                ),
                (Self::$name { .. }, Version::Http10) => concat!(
                    "HTTP/1.0 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: ", $len, "\r\n",
                    "content-type: text/plain\r\n",
                    "\r\n",
                    $msg
                ),
            )* }.as_bytes()
        }
    };
}

impl ErrorKind {
    http_errors! {
        InvalidMethod: "400 Bad Request", "19" => "Invalid HTTP method";

        InvalidUrl: "400 Bad Request", "18" => "Invalid URL format";
        Query: "400 Bad Request", "20" => "Invalid query string";

        InvalidVersion: "400 Bad Request", "20" => "Invalid HTTP version";
        UnsupportedVersion: "505 HTTP Version Not Supported", "26"
            => "HTTP version not supported";

        InvalidHeader: "400 Bad Request", "21" => "Invalid header format";
        TooManyHeaders: "431 Request Header Fields Too Large", "16" => "Too many headers";
        InvalidContentLength: "400 Bad Request", "22" => "Invalid Content-Length";
        InvalidConnection: "400 Bad Request", "25" => "Invalid Connection header";

        BodyTooLarge: "413 Payload Too Large", "22" => "Request body too large";
        BodyMismatch: "400 Bad Request", "20" => "Body length mismatch";
        UnexpectedBody: "400 Bad Request", "23" => "Unexpected request body";

        ServiceUnavailable: "503 Service Unavailable", "31" => "Service temporarily unavailable";
        Io: "503 Service Unavailable", "18" => "I/O error occurred";
    }
}

impl error::Error for ErrorKind {}
impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<query::Error> for ErrorKind {
    fn from(err: query::Error) -> Self {
        ErrorKind::Query(err)
    }
}
impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io(IoError(err))
    }
}

#[derive(Debug)]
pub(crate) struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}
