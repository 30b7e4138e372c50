//! HTTP status codes
//! [RFC 9110 Section 15](https://www.rfc-editor.org/rfc/rfc9110#section-15)

use std::fmt::Display;

/// HTTP status codes
/// [RFC 9110 Section 15](https://www.rfc-editor.org/rfc/rfc9110#section-15)
///
/// Unlike a server, which only ever emits a status it picked itself, this harness parses
/// whatever status a race target answers with, so unrecognized codes fall back to [`Status::Other`]
/// rather than failing to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 15.2.1
    Continue,
    /// 15.2.2
    SwitchingProtocols,
    /// 15.3.1
    Ok,
    /// 15.3.2
    Created,
    /// 15.3.3
    Accepted,
    /// 15.3.4
    NonAuthoritativeInformation,
    /// 15.3.5
    NoContent,
    /// 15.3.6
    ResetContent,
    /// 15.3.7
    PartialContent,
    /// 15.4.1
    MultipleChoices,
    /// 15.4.2
    MovedPermanently,
    /// 15.4.3
    Found,
    /// 15.4.4
    SeeOther,
    /// 15.4.5
    NotModified,
    /// 15.4.6
    UseProxy,
    /// 15.4.8
    TemporaryRedirect,
    /// 15.4.9
    PermanentRedirect,
    /// 15.5.1
    BadRequest,
    /// 15.5.2
    Unauthorized,
    /// 15.5.3
    PaymentRequired,
    /// 15.5.4
    Forbidden,
    /// 15.5.5
    NotFound,
    /// 15.5.6
    MethodNotAllowed,
    /// 15.5.7
    NotAcceptable,
    /// 15.5.8
    ProxyAuthenticationRequired,
    /// 15.5.9
    RequestTimeout,
    /// 15.5.10
    Conflict,
    /// 15.5.11
    Gone,
    /// 15.5.12
    LengthRequired,
    /// 15.5.13
    PreconditionFailed,
    /// 15.5.14
    ContentTooLarge,
    /// 15.5.15
    UriTooLong,
    /// 15.5.16
    UnsupportedMediaType,
    /// 15.5.17
    RangeNotSatisfiable,
    /// 15.5.18
    ExpectationFailed,
    /// 15.5.20
    MisdirectedRequest,
    /// 15.5.21
    UnprocessableContent,
    /// 15.5.22
    UpgradeRequired,
    /// 15.6.1
    InternalServerError,
    /// 15.6.2
    NotImplemented,
    /// 15.6.3
    BadGateway,
    /// 15.6.4
    ServiceUnavailable,
    /// 15.6.5
    GatewayTimeout,
    /// 15.6.6
    HTTPVersionNotSupported,
    /// Any code this enum doesn't name — still recorded, not an error.
    Other(u16),
}

impl Status {
    /// Builds a `Status` from a numeric response code, falling back to [`Status::Other`].
    pub fn from_code(code: u16) -> Self {
        match code {
            100 => Self::Continue,
            101 => Self::SwitchingProtocols,
            200 => Self::Ok,
            201 => Self::Created,
            202 => Self::Accepted,
            203 => Self::NonAuthoritativeInformation,
            204 => Self::NoContent,
            205 => Self::ResetContent,
            206 => Self::PartialContent,
            300 => Self::MultipleChoices,
            301 => Self::MovedPermanently,
            302 => Self::Found,
            303 => Self::SeeOther,
            304 => Self::NotModified,
            305 => Self::UseProxy,
            307 => Self::TemporaryRedirect,
            308 => Self::PermanentRedirect,
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            402 => Self::PaymentRequired,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            405 => Self::MethodNotAllowed,
            406 => Self::NotAcceptable,
            407 => Self::ProxyAuthenticationRequired,
            408 => Self::RequestTimeout,
            409 => Self::Conflict,
            410 => Self::Gone,
            411 => Self::LengthRequired,
            412 => Self::PreconditionFailed,
            413 => Self::ContentTooLarge,
            414 => Self::UriTooLong,
            415 => Self::UnsupportedMediaType,
            416 => Self::RangeNotSatisfiable,
            417 => Self::ExpectationFailed,
            421 => Self::MisdirectedRequest,
            422 => Self::UnprocessableContent,
            426 => Self::UpgradeRequired,
            500 => Self::InternalServerError,
            501 => Self::NotImplemented,
            502 => Self::BadGateway,
            503 => Self::ServiceUnavailable,
            504 => Self::GatewayTimeout,
            505 => Self::HTTPVersionNotSupported,
            other => Self::Other(other),
        }
    }

    /// The numeric status code.
    pub fn code(&self) -> u16 {
        match self {
            Self::Continue => 100,
            Self::SwitchingProtocols => 101,
            Self::Ok => 200,
            Self::Created => 201,
            Self::Accepted => 202,
            Self::NonAuthoritativeInformation => 203,
            Self::NoContent => 204,
            Self::ResetContent => 205,
            Self::PartialContent => 206,
            Self::MultipleChoices => 300,
            Self::MovedPermanently => 301,
            Self::Found => 302,
            Self::SeeOther => 303,
            Self::NotModified => 304,
            Self::UseProxy => 305,
            Self::TemporaryRedirect => 307,
            Self::PermanentRedirect => 308,
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::PaymentRequired => 402,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::NotAcceptable => 406,
            Self::ProxyAuthenticationRequired => 407,
            Self::RequestTimeout => 408,
            Self::Conflict => 409,
            Self::Gone => 410,
            Self::LengthRequired => 411,
            Self::PreconditionFailed => 412,
            Self::ContentTooLarge => 413,
            Self::UriTooLong => 414,
            Self::UnsupportedMediaType => 415,
            Self::RangeNotSatisfiable => 416,
            Self::ExpectationFailed => 417,
            Self::MisdirectedRequest => 421,
            Self::UnprocessableContent => 422,
            Self::UpgradeRequired => 426,
            Self::InternalServerError => 500,
            Self::NotImplemented => 501,
            Self::BadGateway => 502,
            Self::ServiceUnavailable => 503,
            Self::GatewayTimeout => 504,
            Self::HTTPVersionNotSupported => 505,
            Self::Other(code) => *code,
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}", self.code()))
    }
}
