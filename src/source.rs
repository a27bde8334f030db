//! Where events come from: local files or upstream relays.
//!
//! Both sources hand back plain `Vec<Event>` batches; decoding happens
//! afterwards and never sees a connection.

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{client_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{Error, Result},
    event::{Event, Tag},
    signer::verify_event,
};

/// Nostr subscription filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub kinds: Option<Vec<u32>>,
    pub authors: Option<Vec<String>>,
    /// Tag key to allowed first values, e.g. `d -> ["dune"]`.
    pub tags: BTreeMap<String, Vec<String>>,
    pub since: Option<u64>,
    pub until: Option<u64>,
    pub limit: Option<usize>,
}

impl Filter {
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u32>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn authors<S: Into<String>>(mut self, authors: impl IntoIterator<Item = S>) -> Self {
        self.authors = Some(authors.into_iter().map(Into::into).collect());
        self
    }

    pub fn tag<S: Into<String>>(mut self, key: &str, values: impl IntoIterator<Item = S>) -> Self {
        self.tags
            .entry(key.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Whether `ev` satisfies every constraint (limit aside).
    pub fn matches(&self, ev: &Event) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&ev.kind) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.iter().any(|a| a == &ev.pubkey) {
                return false;
            }
        }
        let tags_ok = self.tags.iter().all(|(key, allowed)| {
            ev.tags.iter().any(|t| match t.0.as_slice() {
                [k, v, ..] => k == key && allowed.contains(v),
                _ => false,
            })
        });
        tags_ok
            && self.since.map_or(true, |s| ev.created_at >= s)
            && self.until.map_or(true, |u| ev.created_at <= u)
    }

    /// NIP-01 JSON form, with tag filters written as `#<key>`.
    pub fn to_value(&self) -> Value {
        let mut filter = Map::new();
        if let Some(k) = &self.kinds {
            filter.insert("kinds".into(), json!(k));
        }
        if let Some(a) = &self.authors {
            filter.insert("authors".into(), json!(a));
        }
        for (key, values) in &self.tags {
            filter.insert(format!("#{key}"), json!(values));
        }
        if let Some(s) = self.since {
            filter.insert("since".into(), json!(s));
        }
        if let Some(u) = self.until {
            filter.insert("until".into(), json!(u));
        }
        if let Some(l) = self.limit {
            filter.insert("limit".into(), json!(l));
        }
        Value::Object(filter)
    }

    /// Keep matching events, newest first, truncated to `limit`.
    pub fn apply(&self, events: impl IntoIterator<Item = Event>) -> Vec<Event> {
        let mut out: Vec<Event> = events.into_iter().filter(|ev| self.matches(ev)).collect();
        out.sort_by_key(|e| std::cmp::Reverse(e.created_at));
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

/// Synchronous supplier of event batches.
pub trait EventSource {
    fn fetch(&self, filter: &Filter) -> Result<Vec<Event>>;
}

/// Reads events from JSON files and newline-delimited logs.
///
/// `.json` files hold one event or an array of events; `.ndjson` and
/// `.jsonl` files hold one event per line. Directories are walked
/// recursively. Anything unparseable is skipped with a warning.
#[derive(Debug, Clone)]
pub struct FileSource {
    paths: Vec<PathBuf>,
    verify_sig: bool,
}

impl FileSource {
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>, verify_sig: bool) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            verify_sig,
        }
    }

    /// Every readable event, in file order.
    pub fn read_all(&self) -> Result<Vec<Event>> {
        let mut events = vec![];
        for root in &self.paths {
            for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
                let entry = entry.map_err(|e| Error::Io(e.into()))?;
                if entry.file_type().is_file() {
                    self.read_file(entry.path(), &mut events)?;
                }
            }
        }
        Ok(events)
    }

    fn read_file(&self, path: &Path, out: &mut Vec<Event>) -> Result<()> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let data = fs::read_to_string(path)?;
        match ext {
            "ndjson" | "jsonl" => {
                for (n, line) in data.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Event>(line) {
                        Ok(ev) => self.keep(ev, out),
                        Err(e) => warn!("{}:{}: skipping line: {e}", path.display(), n + 1),
                    }
                }
            }
            "json" => match serde_json::from_str::<Value>(&data) {
                Ok(Value::Array(items)) => {
                    for item in items {
                        match serde_json::from_value::<Event>(item) {
                            Ok(ev) => self.keep(ev, out),
                            Err(e) => warn!("{}: skipping entry: {e}", path.display()),
                        }
                    }
                }
                Ok(val) => match serde_json::from_value::<Event>(val) {
                    Ok(ev) => self.keep(ev, out),
                    Err(e) => warn!("{}: not an event: {e}", path.display()),
                },
                Err(e) => warn!("{}: invalid json: {e}", path.display()),
            },
            _ => debug!("{}: ignored", path.display()),
        }
        Ok(())
    }

    fn keep(&self, ev: Event, out: &mut Vec<Event>) {
        if self.verify_sig {
            if let Err(e) = verify_event(&ev) {
                warn!(id = %ev.id, "dropping event: {e}");
                return;
            }
        }
        out.push(ev);
    }
}

impl EventSource for FileSource {
    fn fetch(&self, filter: &Filter) -> Result<Vec<Event>> {
        Ok(filter.apply(self.read_all()?))
    }
}

/// Fetches stored events from relays over WebSocket.
#[derive(Debug, Clone)]
pub struct RelaySource {
    relays: Vec<String>,
    tor_socks: Option<String>,
    timeout: Duration,
    verify_sig: bool,
}

impl RelaySource {
    pub fn new(relays: Vec<String>) -> Self {
        Self {
            relays,
            tor_socks: None,
            timeout: Duration::from_secs(10),
            verify_sig: false,
        }
    }

    pub fn tor_socks(mut self, proxy: Option<String>) -> Self {
        self.tor_socks = proxy;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn verify_sig(mut self, verify: bool) -> Self {
        self.verify_sig = verify;
        self
    }

    /// Query every relay, merging results by id. A relay that fails is
    /// logged and skipped; the call errors only if all of them fail.
    pub async fn fetch_all(&self, filter: &Filter) -> Result<Vec<Event>> {
        let mut seen = HashSet::new();
        let mut merged = vec![];
        let mut last_err = None;
        let mut any_ok = false;
        for relay in &self.relays {
            match self.fetch(relay, filter).await {
                Ok(events) => {
                    any_ok = true;
                    merged.extend(events.into_iter().filter(|ev| seen.insert(ev.id.clone())));
                }
                Err(e) => {
                    warn!("relay {relay}: {e}");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) if !any_ok => Err(e),
            _ => Ok(filter.apply(merged)),
        }
    }

    /// Stored events from one relay, up to its EOSE.
    pub async fn fetch(&self, relay: &str, filter: &Filter) -> Result<Vec<Event>> {
        tokio::time::timeout(self.timeout, self.fetch_inner(relay, filter))
            .await
            .map_err(|_| Error::Relay(format!("{relay}: timed out")))?
    }

    async fn fetch_inner(&self, relay: &str, filter: &Filter) -> Result<Vec<Event>> {
        let sub_id = "shelfstr";
        let mut ws = connect_ws(relay, self.tor_socks.as_deref()).await?;
        let req = json!(["REQ", sub_id, filter.to_value()]);
        ws.send(Message::Text(req.to_string())).await.map_err(relay_err)?;

        let mut events = vec![];
        while let Some(msg) = ws.next().await {
            let txt = match msg.map_err(relay_err)? {
                Message::Text(txt) => txt,
                Message::Close(_) => break,
                _ => continue,
            };
            let Ok(Value::Array(arr)) = serde_json::from_str::<Value>(&txt) else {
                continue;
            };
            match arr.first().and_then(|v| v.as_str()) {
                Some("EVENT") if arr.len() >= 3 && arr[1].as_str() == Some(sub_id) => {
                    match serde_json::from_value::<Event>(arr[2].clone()) {
                        Ok(ev) if self.verify_sig && verify_event(&ev).is_err() => {
                            warn!(id = %ev.id, "{relay}: dropping event with bad signature");
                        }
                        Ok(ev) => events.push(ev),
                        Err(e) => debug!("{relay}: malformed event: {e}"),
                    }
                }
                Some("EOSE") => break,
                Some("NOTICE") => info!("{relay}: {txt}"),
                Some("CLOSED") => {
                    info!("{relay}: {txt}");
                    break;
                }
                _ => {}
            }
        }
        let close = json!(["CLOSE", sub_id]);
        // Best effort; the relay may already be gone.
        let _ = ws.send(Message::Text(close.to_string())).await;
        let _ = ws.close(None).await;
        debug!("{relay}: {} events", events.len());
        Ok(events)
    }
}

fn relay_err(e: impl std::fmt::Display) -> Error {
    Error::Relay(e.to_string())
}

/// Establish a WebSocket connection, optionally via a SOCKS5 proxy.
async fn connect_ws(
    relay: &str,
    tor_socks: Option<&str>,
) -> Result<WebSocketStream<Box<dyn AsyncReadWrite + Unpin + Send>>> {
    let url = Url::parse(relay).map_err(relay_err)?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::Relay(format!("{relay}: missing host")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| Error::Relay(format!("{relay}: missing port")))?;
    let req = relay.into_client_request().map_err(relay_err)?;
    let stream: Box<dyn AsyncReadWrite + Unpin + Send> = if let Some(proxy) = tor_socks {
        Box::new(
            Socks5Stream::connect(proxy, (host, port))
                .await
                .map_err(relay_err)?,
        )
    } else {
        Box::new(TcpStream::connect((host, port)).await?)
    };
    let (ws, _) = client_async(req, stream).await.map_err(relay_err)?;
    Ok(ws)
}

/// Blanket trait for boxed async read/write streams.
trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

/// Keep only the newest version of each replaceable event, keyed by
/// author, kind and `d` tag. Events without a `d` tag all survive. Output is
/// newest first.
pub fn latest_replaceable(mut events: Vec<Event>) -> Vec<Event> {
    events.sort_by_key(|e| std::cmp::Reverse(e.created_at));
    let mut seen = HashSet::new();
    events.retain(|ev| {
        let d_tag = ev
            .tags
            .iter()
            .find_map(|Tag(fields)| match fields.as_slice() {
                [t, val, ..] if t == "d" => Some(val.clone()),
                _ => None,
            });
        match d_tag {
            Some(d) => seen.insert((ev.pubkey.clone(), ev.kind, d)),
            None => true,
        }
    });
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{KIND_BOOK, KIND_REVIEW};
    use tempfile::TempDir;
    use tokio_tungstenite::{accept_async, tungstenite::Message as TMsg};

    fn sample_event(id: &str, pubkey: &str, kind: u32, dtag: Option<&str>, created: u64) -> Event {
        let mut tags = vec![];
        if let Some(d) = dtag {
            tags.push(Tag::new("d", [d]));
        }
        Event {
            id: id.into(),
            pubkey: pubkey.into(),
            kind,
            created_at: created,
            tags,
            content: String::new(),
            sig: String::new(),
        }
    }

    #[test]
    fn filter_matches_kind_author_tag_and_time() {
        let ev = sample_event("a", "p1", KIND_BOOK, Some("dune"), 20);
        let f = Filter::default()
            .kinds([KIND_BOOK])
            .authors(["p1"])
            .tag("d", ["dune", "other"]);
        assert!(f.matches(&ev));
        assert!(!f.clone().kinds([KIND_REVIEW]).matches(&ev));
        assert!(!f.clone().authors(["p2"]).matches(&ev));
        assert!(!Filter::default().tag("d", ["nope"]).matches(&ev));
        assert!(!Filter::default().tag("t", ["x"]).matches(&ev));
        let timed = Filter {
            since: Some(10),
            until: Some(20),
            ..Default::default()
        };
        assert!(timed.matches(&ev));
        let late = Filter {
            since: Some(21),
            ..Default::default()
        };
        assert!(!late.matches(&ev));
    }

    #[test]
    fn filter_json_uses_hash_prefixed_tags() {
        let f = Filter {
            limit: Some(5),
            since: Some(3),
            ..Filter::default().kinds([30051, 30053]).tag("d", ["dune"])
        };
        assert_eq!(
            f.to_value(),
            json!({"kinds": [30051, 30053], "#d": ["dune"], "since": 3, "limit": 5})
        );
        assert_eq!(Filter::default().to_value(), json!({}));
    }

    #[test]
    fn apply_sorts_newest_first_and_limits() {
        let events = vec![
            sample_event("a", "p", 1, None, 10),
            sample_event("b", "p", 1, None, 30),
            sample_event("c", "p", 1, None, 20),
        ];
        let f = Filter {
            limit: Some(2),
            ..Default::default()
        };
        let ids: Vec<_> = f.apply(events).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn latest_replaceable_keeps_newest_per_key() {
        let events = vec![
            sample_event("old", "p1", KIND_BOOK, Some("dune"), 1),
            sample_event("new", "p1", KIND_BOOK, Some("dune"), 2),
            sample_event("other-author", "p2", KIND_BOOK, Some("dune"), 1),
            sample_event("plain", "p1", 1, None, 0),
        ];
        let ids: Vec<_> = latest_replaceable(events)
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["new", "other-author", "plain"]);
    }

    #[test]
    fn file_source_reads_json_arrays_and_ndjson() {
        let dir = TempDir::new().unwrap();
        let one = sample_event("aa11", "p1", KIND_BOOK, Some("dune"), 1);
        let two = sample_event("bb22", "p1", KIND_REVIEW, None, 2);
        let three = sample_event("cc33", "p2", KIND_BOOK, Some("emma"), 3);
        fs::write(
            dir.path().join("a.json"),
            serde_json::to_string(&one).unwrap(),
        )
        .unwrap();
        fs::write(
            dir.path().join("b.json"),
            serde_json::to_string(&vec![two.clone(), three.clone()]).unwrap(),
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("log")).unwrap();
        fs::write(
            dir.path().join("log/events.ndjson"),
            format!("{}\nnot json\n\n", serde_json::to_string(&three).unwrap()),
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let src = FileSource::new([dir.path()], false);
        assert_eq!(src.read_all().unwrap().len(), 4);

        let books = src.fetch(&Filter::default().kinds([KIND_BOOK])).unwrap();
        let ids: Vec<_> = books.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["cc33", "cc33", "aa11"]);
    }

    #[test]
    fn file_source_drops_unsigned_events_when_verifying() {
        let dir = TempDir::new().unwrap();
        let ev = sample_event("aa11", "p1", KIND_BOOK, None, 1);
        let path = dir.path().join("ev.json");
        fs::write(&path, serde_json::to_string(&ev).unwrap()).unwrap();
        assert!(FileSource::new([&path], true).read_all().unwrap().is_empty());
        assert_eq!(FileSource::new([&path], false).read_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn relay_fetch_collects_until_eose() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let relay_url = format!("ws://{}", addr);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            if let Some(Ok(TMsg::Text(txt))) = ws.next().await {
                assert!(txt.contains("\"#d\":[\"dune\"]"));
            }
            for ev in [
                sample_event("aa11", "p1", KIND_BOOK, Some("dune"), 1),
                sample_event("bb22", "p1", KIND_BOOK, Some("dune"), 2),
            ] {
                ws.send(TMsg::Text(
                    serde_json::json!(["EVENT", "shelfstr", ev]).to_string(),
                ))
                .await
                .unwrap();
            }
            ws.send(TMsg::Text(
                serde_json::json!(["EVENT", "other-sub", sample_event("zz", "p", 1, None, 1)])
                    .to_string(),
            ))
            .await
            .unwrap();
            ws.send(TMsg::Text(serde_json::json!(["EOSE", "shelfstr"]).to_string()))
                .await
                .unwrap();
            // drain CLOSE
            let _ = ws.next().await;
        });

        let src = RelaySource::new(vec![relay_url.clone()]);
        let filter = Filter::default().kinds([KIND_BOOK]).tag("d", ["dune"]);
        let events = src.fetch(&relay_url, &filter).await.unwrap();
        server.abort();
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["aa11", "bb22"]);
    }

    #[tokio::test]
    async fn fetch_all_fails_only_when_every_relay_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let good = format!("ws://{}", listener.local_addr().unwrap());
        // Bound then dropped, so nothing is listening there.
        let dead = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            format!("ws://{}", l.local_addr().unwrap())
        };

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            ws.send(TMsg::Text(
                serde_json::json!([
                    "EVENT",
                    "shelfstr",
                    sample_event("aa11", "p1", KIND_BOOK, None, 1)
                ])
                .to_string(),
            ))
            .await
            .unwrap();
            ws.send(TMsg::Text(serde_json::json!(["EOSE", "shelfstr"]).to_string()))
                .await
                .unwrap();
            let _ = ws.next().await;
        });

        let src = RelaySource::new(vec![dead.clone(), good]).timeout(Duration::from_secs(5));
        let events = src.fetch_all(&Filter::default()).await.unwrap();
        server.abort();
        assert_eq!(events.len(), 1);

        let only_dead = RelaySource::new(vec![dead]).timeout(Duration::from_secs(5));
        assert!(only_dead.fetch_all(&Filter::default()).await.is_err());
    }
}
