use std::time::Duration;

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, UPGRADE_INSECURE_REQUESTS,
};
use reqwest::{redirect, tls, ClientBuilder};
use serde::{Deserialize, Serialize};

const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const FIREFOX_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0";

/// Client identity presented by direct fetches.
///
/// Each profile pins the user agent, the request headers and the HTTP/2
/// flow-control windows the named browser sends, so the connection looks
/// like that browser to basic bot detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientProfile {
    #[default]
    Chrome,
    Firefox,
}

impl ClientProfile {
    pub fn user_agent(self) -> &'static str {
        match self {
            Self::Chrome => CHROME_USER_AGENT,
            Self::Firefox => FIREFOX_USER_AGENT,
        }
    }

    pub fn headers(self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

        match self {
            Self::Chrome => {
                headers.insert(
                    HeaderName::from_static("sec-ch-ua"),
                    HeaderValue::from_static(
                        "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"",
                    ),
                );
                headers.insert(
                    HeaderName::from_static("sec-ch-ua-mobile"),
                    HeaderValue::from_static("?0"),
                );
                headers.insert(
                    HeaderName::from_static("sec-ch-ua-platform"),
                    HeaderValue::from_static("\"Windows\""),
                );
                headers.insert(
                    ACCEPT,
                    HeaderValue::from_static(
                        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,\
                         image/webp,image/apng,*/*;q=0.8",
                    ),
                );
                headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
            }
            Self::Firefox => {
                headers.insert(
                    ACCEPT,
                    HeaderValue::from_static(
                        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,\
                         image/webp,*/*;q=0.8",
                    ),
                );
                headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
            }
        }

        headers.insert(
            HeaderName::from_static("sec-fetch-dest"),
            HeaderValue::from_static("document"),
        );
        headers.insert(
            HeaderName::from_static("sec-fetch-mode"),
            HeaderValue::from_static("navigate"),
        );
        headers.insert(
            HeaderName::from_static("sec-fetch-site"),
            HeaderValue::from_static("none"),
        );
        headers
    }

    /// (stream, connection) initial HTTP/2 window sizes
    fn http2_windows(self) -> (u32, u32) {
        match self {
            Self::Chrome => (6_291_456, 15_728_640),
            Self::Firefox => (131_072, 12_517_377),
        }
    }

    /// A client builder carrying this profile and the given request timeout.
    pub fn client_builder(self, timeout: Duration) -> ClientBuilder {
        let (stream_window, conn_window) = self.http2_windows();

        reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(self.user_agent())
            .default_headers(self.headers())
            .min_tls_version(tls::Version::TLS_1_2)
            .http2_initial_stream_window_size(stream_window)
            .http2_initial_connection_window_size(conn_window)
            .gzip(true)
            .brotli(true)
            .redirect(redirect::Policy::limited(10))
    }
}
