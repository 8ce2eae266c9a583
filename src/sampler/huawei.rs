use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header, Client, Response, StatusCode};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{CounterSampler, DeviceError, TrafficReading};

const SESSION_PATH: &str = "api/webserver/SesTokInfo";
const LOGIN_PATH: &str = "api/user/login";
const LOGOUT_PATH: &str = "api/user/logout";
const TRAFFIC_PATH: &str = "api/monitoring/traffic-statistics";
const TOKEN_HEADER: &str = "__RequestVerificationToken";
const DEFAULT_USER: &str = "admin";

#[derive(Clone, Debug)]
pub struct SamplerOptions {
    pub host: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

/// Samples traffic statistics from a Huawei LTE/5G router web API.
///
/// Every cycle opens its own session (and logs in when a password is
/// configured), mirroring how the web UI talks to the device.
pub struct HuaweiSampler {
    base_url: String,
    user: String,
    password: Option<String>,
    http: Client,
}

#[derive(Clone, Debug, Default)]
struct Session {
    cookie: Option<String>,
    token: Option<String>,
}

impl HuaweiSampler {
    pub fn new(opts: SamplerOptions) -> Result<Self, DeviceError> {
        let http = Client::builder().timeout(opts.timeout).build()?;
        let host = opts.host.trim_end_matches('/');
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}/")
        } else {
            format!("http://{host}/")
        };
        Ok(Self {
            base_url,
            user: opts.user.filter(|u| !u.is_empty()).unwrap_or_else(|| DEFAULT_USER.to_string()),
            password: opts.password.filter(|p| !p.is_empty()),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_session(&self, mut req: reqwest::RequestBuilder, session: &Session) -> reqwest::RequestBuilder {
        if let Some(cookie) = &session.cookie {
            req = req.header(header::COOKIE, cookie);
        }
        if let Some(token) = &session.token {
            req = req.header(TOKEN_HEADER, token);
        }
        req
    }

    async fn open_session(&self) -> Result<Session, DeviceError> {
        let body = read_body(self.http.get(self.url(SESSION_PATH)).send().await?).await?;
        let doc = expect_response(&body)?;
        Ok(Session {
            cookie: text_field(&doc.fields, "SesInfo"),
            token: text_field(&doc.fields, "TokInfo"),
        })
    }

    async fn login(&self, session: Session, password: &str) -> Result<Session, DeviceError> {
        let token = session.token.clone().unwrap_or_default();
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><request><Username>{}</Username><Password>{}</Password><password_type>4</password_type></request>",
            escape(&self.user),
            login_password(&self.user, password, &token),
        );
        let resp = self
            .with_session(self.http.post(self.url(LOGIN_PATH)), &session)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded; charset=UTF-8")
            .body(body)
            .send()
            .await?;

        // the device rotates both the session cookie and the token on login
        let cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
            .or(session.cookie);
        let token = ["__RequestVerificationTokenone", TOKEN_HEADER]
            .iter()
            .find_map(|h| resp.headers().get(*h))
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split('#').next().unwrap_or(v).to_string())
            .or(session.token);

        expect_response(&read_body(resp).await?)?;
        debug!(user = %self.user, "logged in to router");
        Ok(Session { cookie, token })
    }

    async fn logout(&self, session: &Session) {
        let body = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><request><Logout>1</Logout></request>";
        let result = self
            .with_session(self.http.post(self.url(LOGOUT_PATH)), session)
            .body(body)
            .send()
            .await;
        if let Err(e) = result {
            debug!(error = %e, "router logout failed");
        }
    }

    async fn traffic(&self, session: &Session) -> Result<Map<String, Value>, DeviceError> {
        let resp = self.with_session(self.http.get(self.url(TRAFFIC_PATH)), session).send().await?;
        let body = read_body(resp).await?;
        Ok(expect_response(&body)?.fields)
    }
}

#[async_trait]
impl CounterSampler for HuaweiSampler {
    async fn get_counters(&self) -> Result<TrafficReading, DeviceError> {
        let Some(password) = self.password.as_deref() else {
            // many firmwares expose statistics without a login
            let session = match self.open_session().await {
                Ok(s) => s,
                Err(e @ (DeviceError::Unreachable(_) | DeviceError::Timeout)) => return Err(e),
                Err(e) => {
                    debug!(error = %e, "no session token, trying anonymous read");
                    Session::default()
                }
            };
            return Ok(TrafficReading::new(self.traffic(&session).await?));
        };

        let session = self.open_session().await?;
        let session = self.login(session, password).await?;
        let result = self.traffic(&session).await;
        self.logout(&session).await;
        Ok(TrafficReading::new(result?))
    }
}

async fn read_body(resp: Response) -> Result<String, DeviceError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(DeviceError::Authentication { code: status.as_u16().into() });
    }
    if !status.is_success() {
        return Err(DeviceError::Http { status: status.as_u16() });
    }
    Ok(resp.text().await?)
}

fn hex_sha256(input: &str) -> String {
    Sha256::digest(input.as_bytes()).iter().map(|b| format!("{b:02x}")).collect()
}

pub(crate) fn login_password(user: &str, password: &str, token: &str) -> String {
    let hashed = STANDARD.encode(hex_sha256(password));
    STANDARD.encode(hex_sha256(&format!("{user}{hashed}{token}")))
}

fn is_auth_code(code: u32) -> bool {
    matches!(code, 108001..=108007 | 125002 | 125003)
}

fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string)
}

/// A parsed document of the shape `<root><A>1</A><B>x</B></root>`.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct FlatXml {
    pub root: String,
    pub text: Option<String>,
    pub fields: Map<String, Value>,
}

fn expect_response(body: &str) -> Result<FlatXml, DeviceError> {
    let doc = parse_flat_xml(body)?;
    match doc.root.as_str() {
        "response" => Ok(doc),
        "error" => {
            let code = text_field(&doc.fields, "code")
                .and_then(|c| c.trim().parse::<u32>().ok())
                .ok_or_else(|| DeviceError::Malformed("error without code".into()))?;
            if is_auth_code(code) {
                Err(DeviceError::Authentication { code })
            } else {
                Err(DeviceError::Rejected { code })
            }
        }
        other => Err(DeviceError::Malformed(format!("unexpected root element <{other}>"))),
    }
}

fn malformed(msg: &str) -> DeviceError {
    DeviceError::Malformed(msg.to_string())
}

// name of the tag starting at `s` (just after '<'), plus whether it self-closes
fn read_tag(s: &str) -> Result<(&str, bool, &str), DeviceError> {
    let end = s.find('>').ok_or_else(|| malformed("unterminated tag"))?;
    let inner = &s[..end];
    let self_closing = inner.ends_with('/');
    let name = inner
        .trim_end_matches('/')
        .split(|c: char| c.is_whitespace())
        .next()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| malformed("empty tag name"))?;
    Ok((name, self_closing, &s[end + 1..]))
}

pub(crate) fn parse_flat_xml(body: &str) -> Result<FlatXml, DeviceError> {
    let mut rest = body.trim_start();
    if rest.starts_with("<?") {
        let end = rest.find("?>").ok_or_else(|| malformed("unterminated declaration"))?;
        rest = rest[end + 2..].trim_start();
    }
    let rest = rest.strip_prefix('<').ok_or_else(|| malformed("missing root element"))?;
    let (root, self_closing, after) = read_tag(rest)?;
    let mut doc = FlatXml { root: root.to_string(), ..FlatXml::default() };
    if self_closing {
        return Ok(doc);
    }
    let close = format!("</{root}>");
    let end = after.rfind(&close).ok_or_else(|| malformed("missing closing root tag"))?;
    let mut inner = after[..end].trim();

    if !inner.starts_with('<') {
        if !inner.is_empty() {
            doc.text = Some(unescape(inner));
        }
        return Ok(doc);
    }

    while let Some(child) = inner.strip_prefix('<') {
        let (name, self_closing, after) = read_tag(child)?;
        if self_closing {
            doc.fields.insert(name.to_string(), Value::String(String::new()));
            inner = after.trim_start();
            continue;
        }
        let close = format!("</{name}>");
        let end = after.find(&close).ok_or_else(|| malformed("unclosed child element"))?;
        doc.fields.insert(name.to_string(), Value::String(unescape(after[..end].trim())));
        inner = after[end + close.len()..].trim_start();
    }
    Ok(doc)
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{header as h, HeaderMap, StatusCode},
        routing::{get, post},
        Router,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const TRAFFIC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<response>
<CurrentConnectTime>1234</CurrentConnectTime>
<CurrentUpload>500000</CurrentUpload>
<CurrentDownload>1000000</CurrentDownload>
<CurrentDownloadRate>2048</CurrentDownloadRate>
<CurrentUploadRate>512</CurrentUploadRate>
<TotalUpload>900000</TotalUpload>
<TotalDownload>9000000</TotalDownload>
<showtraffic>1</showtraffic>
</response>"#;

    #[test]
    fn parses_response_fields() {
        let doc = parse_flat_xml(TRAFFIC).unwrap();
        assert_eq!(doc.root, "response");
        assert_eq!(doc.fields.get("CurrentDownload"), Some(&Value::String("1000000".into())));
        assert_eq!(doc.fields.len(), 8);
    }

    #[test]
    fn parses_text_only_response() {
        let doc = parse_flat_xml("<?xml version=\"1.0\"?><response>OK</response>").unwrap();
        assert_eq!(doc.text.as_deref(), Some("OK"));
        assert!(doc.fields.is_empty());
    }

    #[test]
    fn parses_empty_and_escaped_children() {
        let doc = parse_flat_xml("<response><A/><B>a &amp; b</B><C></C></response>").unwrap();
        assert_eq!(doc.fields["A"], Value::String(String::new()));
        assert_eq!(doc.fields["B"], Value::String("a & b".into()));
        assert_eq!(doc.fields["C"], Value::String(String::new()));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_flat_xml("not xml"), Err(DeviceError::Malformed(_))));
        assert!(matches!(parse_flat_xml("<response><A>1</response>"), Err(DeviceError::Malformed(_))));
    }

    #[test]
    fn error_document_maps_codes() {
        let auth = expect_response("<error><code>108006</code><message></message></error>");
        assert!(matches!(auth, Err(DeviceError::Authentication { code: 108006 })));
        let other = expect_response("<error><code>100002</code><message></message></error>");
        assert!(matches!(other, Err(DeviceError::Rejected { code: 100002 })));
    }

    #[test]
    fn password_type_4_encoding() {
        assert_eq!(
            login_password("admin", "secret", "tok123"),
            "NDAxZWVmOWNiMTA3MzBjNjkwN2YzZGU1NTQ1ODUzY2JjNzg2MzIwNmUzZWQzNzY1MjRkYWRlMTk4YjY2Yjk0Nw=="
        );
    }

    fn xml(body: &'static str) -> (StatusCode, [(h::HeaderName, &'static str); 1], &'static str) {
        (StatusCode::OK, [(h::CONTENT_TYPE, "text/xml")], body)
    }

    async fn stub_router(expected_password: &'static str, logouts: Arc<AtomicUsize>) -> String {
        let app = Router::new()
            .route(
                "/api/webserver/SesTokInfo",
                get(|| async {
                    xml("<response><SesInfo>SessionID=first</SesInfo><TokInfo>tok123</TokInfo></response>")
                }),
            )
            .route(
                "/api/user/login",
                post(move |body: String| async move {
                    if body.contains(expected_password) {
                        (
                            StatusCode::OK,
                            [
                                (h::SET_COOKIE, "SessionID=second; path=/; HttpOnly"),
                                (h::CONTENT_TYPE, "text/xml"),
                            ],
                            "<response>OK</response>",
                        )
                    } else {
                        (
                            StatusCode::OK,
                            [
                                (h::SET_COOKIE, "SessionID=first; path=/"),
                                (h::CONTENT_TYPE, "text/xml"),
                            ],
                            "<error><code>108006</code><message></message></error>",
                        )
                    }
                }),
            )
            .route(
                "/api/user/logout",
                post(move || async move {
                    logouts.fetch_add(1, Ordering::SeqCst);
                    xml("<response>OK</response>")
                }),
            )
            .route(
                "/api/monitoring/traffic-statistics",
                get(|headers: HeaderMap| async move {
                    let cookie = headers.get(h::COOKIE).and_then(|v| v.to_str().ok()).unwrap_or("");
                    if cookie == "SessionID=first" || cookie == "SessionID=second" {
                        xml(TRAFFIC)
                    } else {
                        xml("<error><code>125002</code><message></message></error>")
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("127.0.0.1:{}", addr.port())
    }

    fn sampler(host: String, password: Option<&str>) -> HuaweiSampler {
        HuaweiSampler::new(SamplerOptions {
            host,
            user: None,
            password: password.map(str::to_string),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn anonymous_read_returns_fields() {
        let logouts = Arc::new(AtomicUsize::new(0));
        let host = stub_router("unused", logouts.clone()).await;
        let reading = sampler(host, None).get_counters().await.unwrap();
        let s = reading.raw_sample();
        assert_eq!(s.rx_bytes, 1_000_000);
        assert_eq!(s.tx_bytes, 500_000);
        assert_eq!(s.rx_rate_hint, Some(2048.0));
        assert_eq!(logouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn login_then_read_then_logout() {
        let logouts = Arc::new(AtomicUsize::new(0));
        let expected = "NDAxZWVmOWNiMTA3MzBjNjkwN2YzZGU1NTQ1ODUzY2JjNzg2MzIwNmUzZWQzNzY1MjRkYWRlMTk4YjY2Yjk0Nw==";
        let host = stub_router(expected, logouts.clone()).await;
        let reading = sampler(host, Some("secret")).get_counters().await.unwrap();
        assert_eq!(reading.fields.get("TotalDownload"), Some(&Value::String("9000000".into())));
        assert_eq!(logouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wrong_password_is_authentication_error() {
        let logouts = Arc::new(AtomicUsize::new(0));
        let host = stub_router("never-matches", logouts).await;
        let err = sampler(host, Some("wrong")).get_counters().await.unwrap_err();
        assert!(matches!(err, DeviceError::Authentication { code: 108006 }));
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = sampler(addr.to_string(), None).get_counters().await.unwrap_err();
        assert!(matches!(err, DeviceError::Unreachable(_)));
    }

    #[tokio::test]
    async fn http_status_errors_are_classified() {
        let app = Router::new()
            .route(
                "/api/webserver/SesTokInfo",
                get(|| async { xml("<response><SesInfo>SessionID=a</SesInfo><TokInfo>t</TokInfo></response>") }),
            )
            .route("/api/monitoring/traffic-statistics", get(|| async { StatusCode::UNAUTHORIZED }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let err = sampler(addr.to_string(), None).get_counters().await.unwrap_err();
        assert!(matches!(err, DeviceError::Authentication { code: 401 }));

        let app = Router::new().route("/api/monitoring/traffic-statistics", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        // no session endpoint: anonymous read still tries the statistics
        let err = sampler(addr.to_string(), None).get_counters().await.unwrap_err();
        assert!(matches!(err, DeviceError::Http { status: 503 }));
    }

    #[test]
    fn https_hosts_keep_their_scheme() {
        let s = sampler("https://router.lan/".into(), None);
        assert_eq!(s.url(SESSION_PATH), "https://router.lan/api/webserver/SesTokInfo");
    }

    #[test]
    fn empty_password_means_anonymous() {
        let s = sampler("192.168.8.1".into(), Some(""));
        assert!(s.password.is_none());
        assert_eq!(s.user, "admin");
        assert_eq!(s.url(TRAFFIC_PATH), "http://192.168.8.1/api/monitoring/traffic-statistics");
    }
}
