//! Test doubles shared by the service tests

use super::clock::Clock;
use super::oracle::{OracleError, PriceOracle};
use super::trade_api::{BuyReceipt, SellReceipt, TradeApi, TradeApiError};
use crate::ledger::{JsonLedgerStore, Ledger, LedgerHandle};
use crate::types::{Acquisition, Position, PositionStatus};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Clock that records requested sleeps and returns immediately
#[derive(Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel `token` once `sleeps` sleeps have been requested
    pub fn cancel_after(self, sleeps: usize, token: CancellationToken) -> Self {
        *self.cancel_after.lock().unwrap() = Some((sleeps, token));
        self
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    async fn sleep(&self, duration: Duration) {
        let count = {
            let mut sleeps = self.sleeps.lock().unwrap();
            sleeps.push(duration);
            sleeps.len()
        };
        let to_cancel = {
            let cancel_after = self.cancel_after.lock().unwrap();
            cancel_after
                .as_ref()
                .filter(|(limit, _)| count >= *limit)
                .map(|(_, token)| token.clone())
        };
        if let Some(token) = to_cancel {
            token.cancel();
        }
        tokio::task::yield_now().await;
    }
}

/// Oracle answering from a per-mint script. The last scripted answer repeats.
#[derive(Default)]
pub struct FakeOracle {
    answers: Mutex<HashMap<String, VecDeque<Result<Decimal, OracleError>>>>,
    calls: Mutex<Vec<String>>,
    hang: bool,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches that never complete
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn price(self, mint: &str, price: Decimal) -> Self {
        self.answer(mint, Ok(price))
    }

    pub fn unavailable(self, mint: &str) -> Self {
        self.answer(
            mint,
            Err(OracleError::Unavailable {
                mint: mint.to_string(),
                attempts: 3,
                last_error: "HTTP 500".to_string(),
            }),
        )
    }

    pub fn answer(self, mint: &str, answer: Result<Decimal, OracleError>) -> Self {
        self.answers
            .lock()
            .unwrap()
            .entry(mint.to_string())
            .or_default()
            .push_back(answer);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PriceOracle for FakeOracle {
    async fn fetch_price(&self, mint: &str) -> Result<Decimal, OracleError> {
        self.calls.lock().unwrap().push(mint.to_string());
        if self.hang {
            std::future::pending::<()>().await;
        }
        let mut answers = self.answers.lock().unwrap();
        let queue = answers.get_mut(mint);
        match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Err(OracleError::Parse(format!("no scripted price for {}", mint))),
        }
    }
}

/// Trade API that replays scripted sell results, then fails
#[derive(Default)]
pub struct ScriptedTradeApi {
    sells: Mutex<VecDeque<Result<SellReceipt, TradeApiError>>>,
    sell_calls: Mutex<Vec<(String, Decimal)>>,
    hang: bool,
}

impl ScriptedTradeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sells that never complete
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn sell_result(self, result: Result<SellReceipt, TradeApiError>) -> Self {
        self.sells.lock().unwrap().push_back(result);
        self
    }

    pub fn sell_calls(&self) -> Vec<(String, Decimal)> {
        self.sell_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TradeApi for ScriptedTradeApi {
    async fn sell(&self, mint: &str, amount: Decimal) -> Result<SellReceipt, TradeApiError> {
        self.sell_calls
            .lock()
            .unwrap()
            .push((mint.to_string(), amount));
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.sells
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TradeApiError::Rejected("insufficient liquidity".to_string())))
    }

    async fn buy(&self, _mint: &str, _amount: Decimal) -> Result<BuyReceipt, TradeApiError> {
        Err(TradeApiError::Rejected("buy not scripted".to_string()))
    }
}

/// Ledger backed by a file in a fresh temp directory
pub struct TempLedger {
    pub dir: TempDir,
    pub path: PathBuf,
    pub handle: LedgerHandle,
}

impl TempLedger {
    pub async fn with_positions(positions: Vec<Position>) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        let mut ledger = Ledger::new();
        for position in positions {
            ledger.upsert(position);
        }
        JsonLedgerStore::new(&path).save(&ledger).await.unwrap();
        let handle = LedgerHandle::spawn(JsonLedgerStore::new(&path));
        Self { dir, path, handle }
    }

    /// Current document as written on disk
    pub async fn on_disk(&self) -> Ledger {
        JsonLedgerStore::new(&self.path).load().await.unwrap()
    }
}

pub fn position(mint: &str, status: PositionStatus, tokens: Decimal, entry_price: Decimal) -> Position {
    let mut position = Position::from_acquisition(&Acquisition {
        mint: mint.to_string(),
        base_invested: Decimal::ONE,
        token_quantity: tokens,
        entry_price,
    });
    position.status = status;
    position
}

#[derive(Debug, Clone)]
struct RecordedRequest {
    line: String,
    body: String,
}

/// Minimal HTTP/1.1 server replaying canned `(status, body)` responses.
/// The last response repeats once the script runs out.
pub struct HttpStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl HttpStub {
    pub async fn start(responses: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        tokio::spawn(async move {
            let mut script = VecDeque::from(responses);
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let response = if script.len() > 1 {
                    script.pop_front()
                } else {
                    script.front().cloned()
                };
                let (status, body) = response.unwrap_or((404, String::new()));
                serve_one(stream, status, body, &recorded).await;
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    /// Request lines, e.g. `POST /sell HTTP/1.1`
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.line.clone())
            .collect()
    }

    pub fn body(&self, index: usize) -> String {
        self.requests.lock().unwrap()[index].body.clone()
    }
}

async fn serve_one(
    mut stream: TcpStream,
    status: u16,
    body: String,
    recorded: &Arc<Mutex<Vec<RecordedRequest>>>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buf.len() < body_start + content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    let body_end = buf.len().min(body_start + content_length);
    let request_body = String::from_utf8_lossy(&buf[body_start..body_end]).to_string();

    recorded.lock().unwrap().push(RecordedRequest {
        line: head.lines().next().unwrap_or_default().to_string(),
        body: request_body,
    });

    let reason = if status < 400 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
