// Integration tests for Uatu Sweeper
// The scheduler is driven against a scripted navigation provider so runs are
// deterministic and need no browser.

pub mod api_tests;
pub mod recovery_tests;

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use uatu_sweeper::{
    extraction::result_text, AppError, ExtractionSettings, NavigationProvider, PageExtraction, PageHandle,
    PriceExtractor, QueueEvent, QueueScheduler, QueueSettings, RunConfig, SchedulerHandle, StateStore,
};

/// What the scripted browser shows for one visit of a task.
#[derive(Debug, Clone)]
pub enum Step {
    /// A results page with this HTML.
    Page(String),
    /// A bot-check interstitial.
    Challenge,
    /// Navigation error.
    Fail,
}

pub fn page(body: &str) -> Step {
    Step::Page(format!("<html><body><div id=\"search\">{}</div></body></html>", body))
}

/// Navigation provider that serves scripted steps per task and records
/// what the scheduler asked for.
pub struct ScriptedNavigator {
    extractor: PriceExtractor,
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    pages: Mutex<HashMap<uuid::Uuid, String>>,
    opened: Mutex<Vec<String>>,
    closed: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    hang_loads: bool,
    fail_closes: bool,
}

impl ScriptedNavigator {
    pub fn new() -> Self {
        Self {
            extractor: PriceExtractor::new(ExtractionSettings::default()).unwrap(),
            scripts: Mutex::new(HashMap::new()),
            pages: Mutex::new(HashMap::new()),
            opened: Mutex::new(Vec::new()),
            closed: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            gate: None,
            hang_loads: false,
            fail_closes: false,
        }
    }

    /// Extraction blocks until the returned semaphore hands out a permit.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let navigator = Self {
            gate: Some(gate.clone()),
            ..Self::new()
        };
        (navigator, gate)
    }

    /// Queues `steps` for successive visits of `task`. Unscripted visits get
    /// an empty results page.
    pub fn script(self, task: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(task.to_string())
            .or_default()
            .extend(steps);
        self
    }

    /// Page loads never report completion; only the load ceiling ends the wait.
    pub fn hanging_loads(mut self) -> Self {
        self.hang_loads = true;
        self
    }

    /// Every page close reports an error after releasing the page.
    pub fn failing_closes(mut self) -> Self {
        self.fail_closes = true;
        self
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn next_step(&self, task: &str) -> Step {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(task)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| page(""))
    }
}

pub fn task_from_url(raw: &str) -> String {
    let url = url::Url::parse(raw).unwrap();
    let query = url
        .query_pairs()
        .find(|(key, _)| key == "q" || key == "text")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default();
    query.trim_matches('"').to_string()
}

#[async_trait]
impl NavigationProvider for ScriptedNavigator {
    async fn open_page(&self, url: &str) -> uatu_sweeper::Result<PageHandle> {
        let task = task_from_url(url);
        self.opened.lock().unwrap().push(task.clone());

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let page = PageHandle::new(url);
        self.pages.lock().unwrap().insert(page.id, task);
        Ok(page)
    }

    async fn wait_until_loaded(&self, _page: &PageHandle, _timeout: Duration) {
        if self.hang_loads {
            std::future::pending::<()>().await;
        }
    }

    async fn run_extraction(&self, page: &PageHandle) -> uatu_sweeper::Result<PageExtraction> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        let task = self.pages.lock().unwrap().get(&page.id).cloned().unwrap_or_default();
        match self.next_step(&task) {
            Step::Page(html) => Ok(PageExtraction::prices(self.extractor.extract(&result_text(&html)))),
            Step::Challenge => Ok(PageExtraction::challenge()),
            Step::Fail => Err(AppError::navigation("net::ERR_CONNECTION_RESET")),
        }
    }

    async fn close_page(&self, page: &PageHandle) -> uatu_sweeper::Result<()> {
        self.pages.lock().unwrap().remove(&page.id);
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_closes {
            return Err(AppError::navigation("Target closed"));
        }
        Ok(())
    }
}

pub fn test_run_config() -> RunConfig {
    RunConfig {
        delay_ms: 1000,
        use_quotes: false,
        limit_count: 0,
        ..RunConfig::default()
    }
}

pub fn items(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

pub async fn spawn_scheduler(
    navigator: Arc<ScriptedNavigator>,
    store: Arc<dyn StateStore>,
    settings: QueueSettings,
) -> (SchedulerHandle, JoinHandle<()>) {
    QueueScheduler::new(test_run_config(), settings, navigator, store)
        .spawn()
        .await
}

/// Next event, failing the test if none arrives within a minute of (virtual) time.
pub async fn next_event(rx: &mut broadcast::Receiver<QueueEvent>) -> QueueEvent {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for a queue event")
        .expect("event stream closed")
}

/// Collects events up to and including the first one matching `stop`.
pub async fn events_until<F>(rx: &mut broadcast::Receiver<QueueEvent>, stop: F) -> Vec<QueueEvent>
where
    F: Fn(&QueueEvent) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let event = next_event(rx).await;
        let last = stop(&event);
        seen.push(event);
        if last {
            return seen;
        }
    }
}

pub fn progress_tasks(events: &[QueueEvent]) -> Vec<(usize, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            QueueEvent::Progress { cursor, task, .. } => Some((*cursor, task.clone())),
            _ => None,
        })
        .collect()
}
