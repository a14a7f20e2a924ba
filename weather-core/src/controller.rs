//! Request-lifecycle state machine behind the city lookup form.
//!
//! Every accepted submission gets a fresh [`AttemptToken`]. Submitting again
//! cancels the previous token and aborts its task; a lookup that still
//! completes afterwards is discarded rather than applied. The token check and
//! the state write happen under the same `watch` lock, so a superseded lookup
//! can never overwrite the state of a newer one.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info};

use crate::{
    error::LookupError,
    model::{Query, RequestState, WeatherReport},
    provider::WeatherProvider,
};

/// Per-lookup staleness guard.
#[derive(Debug, Clone)]
pub struct AttemptToken {
    attempt_id: u64,
    canceled: Arc<AtomicBool>,
}

impl AttemptToken {
    fn new(attempt_id: u64) -> Self {
        Self { attempt_id, canceled: Arc::new(AtomicBool::new(false)) }
    }

    pub fn attempt_id(&self) -> u64 {
        self.attempt_id
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }
}

#[derive(Debug)]
struct StateCell {
    tx: watch::Sender<RequestState>,
}

impl StateCell {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(RequestState::Idle);
        Self { tx }
    }

    /// Cancels `previous` and enters `Loading` in one step.
    ///
    /// Subscribers are only notified when the state was not already `Loading`.
    fn begin(&self, previous: Option<&AttemptToken>) {
        self.tx.send_if_modified(|state| {
            if let Some(token) = previous {
                token.cancel();
            }
            let was_loading = state.is_loading();
            *state = RequestState::Loading;
            !was_loading
        });
    }

    /// Applies the outcome unless `token` was canceled. Returns whether it was applied.
    fn resolve(&self, token: &AttemptToken, outcome: Result<WeatherReport, LookupError>) -> bool {
        self.tx.send_if_modified(|state| {
            if token.is_canceled() {
                return false;
            }
            *state = match outcome {
                Ok(report) => RequestState::Success(report),
                Err(err) => RequestState::Failed(err.to_string()),
            };
            true
        })
    }

    fn cancel(&self, token: &AttemptToken) {
        self.tx.send_if_modified(|_| {
            token.cancel();
            false
        });
    }
}

#[derive(Debug)]
struct InFlight {
    token: AttemptToken,
    task: JoinHandle<()>,
}

/// Owns the input text, the active query, and the single live lookup.
///
/// Lookups are spawned onto the ambient tokio runtime, so `submit` must be
/// called from within one.
#[derive(Debug)]
pub struct LookupController {
    provider: Arc<dyn WeatherProvider>,
    cell: Arc<StateCell>,
    input: String,
    query: Option<Query>,
    inflight: Option<InFlight>,
    attempts: u64,
}

impl LookupController {
    pub fn new(provider: Arc<dyn WeatherProvider>) -> Self {
        Self {
            provider,
            cell: Arc::new(StateCell::new()),
            input: String::new(),
            query: None,
            inflight: None,
            attempts: 0,
        }
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Submits whatever is currently in the input box.
    pub fn submit_input(&mut self) -> bool {
        let text = self.input.clone();
        self.submit(&text)
    }

    /// Accepts a city name and starts a lookup for it.
    ///
    /// Blank input is ignored and leaves every piece of state untouched.
    /// Otherwise the state is `Loading` by the time this returns, and any
    /// earlier lookup (even for the same city) has been superseded.
    pub fn submit(&mut self, city_text: &str) -> bool {
        let Some(query) = Query::parse(city_text) else {
            debug!("Ignoring blank submission");
            return false;
        };

        self.attempts += 1;
        let token = AttemptToken::new(self.attempts);

        let previous = self.inflight.take();
        self.cell.begin(previous.as_ref().map(|inflight| &inflight.token));
        if let Some(previous) = previous {
            debug!(attempt = previous.token.attempt_id(), "Superseding previous lookup");
            previous.task.abort();
        }

        debug!(attempt = token.attempt_id(), query = %query, "Starting lookup");

        let task = tokio::spawn(run_lookup(
            Arc::clone(&self.provider),
            Arc::clone(&self.cell),
            token.clone(),
            query.clone(),
        ));

        self.query = Some(query);
        self.inflight = Some(InFlight { token, task });
        true
    }

    /// The last accepted query, if any.
    pub fn query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    pub fn state(&self) -> RequestState {
        self.cell.tx.borrow().clone()
    }

    /// Observe state transitions as they happen.
    pub fn subscribe(&self) -> watch::Receiver<RequestState> {
        self.cell.tx.subscribe()
    }

    /// Waits until the current lookup (if any) has resolved.
    pub async fn settled(&self) -> RequestState {
        let mut rx = self.cell.tx.subscribe();
        match rx.wait_for(|state| !state.is_loading()).await {
            Ok(state) => (*state).clone(),
            Err(_) => self.state(),
        }
    }
}

impl Drop for LookupController {
    fn drop(&mut self) {
        if let Some(inflight) = self.inflight.take() {
            self.cell.cancel(&inflight.token);
            inflight.task.abort();
        }
    }
}

async fn run_lookup(
    provider: Arc<dyn WeatherProvider>,
    cell: Arc<StateCell>,
    token: AttemptToken,
    query: Query,
) {
    let outcome = provider.current_weather(&query).await;

    match &outcome {
        Ok(report) => info!(
            attempt = token.attempt_id(),
            location = %report.location,
            "Lookup succeeded"
        ),
        Err(err) => info!(attempt = token.attempt_id(), error = %err, "Lookup failed"),
    }

    if !cell.resolve(&token, outcome) {
        debug!(attempt = token.attempt_id(), "Discarded result of superseded lookup");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Condition;
    use async_trait::async_trait;
    use std::{
        collections::{HashMap, VecDeque},
        sync::{Mutex, atomic::AtomicUsize},
    };
    use tokio::sync::oneshot;

    type Outcome = Result<WeatherReport, LookupError>;

    fn report(city: &str) -> WeatherReport {
        WeatherReport {
            location: city.to_string(),
            country: "XX".to_string(),
            condition: Condition {
                category: "Clouds".into(),
                description: "broken clouds".into(),
                icon: "04d".into(),
            },
            temperature_c: 12.0,
            feels_like_c: 11.0,
            humidity_pct: 70,
            wind_speed_mps: 4.0,
            observed_at: None,
        }
    }

    /// Each call for a city waits on the next gate queued for that city.
    #[derive(Debug, Default)]
    struct GatedProvider {
        calls: AtomicUsize,
        gates: Mutex<HashMap<String, VecDeque<oneshot::Receiver<Outcome>>>>,
    }

    impl GatedProvider {
        fn gate(&self, city: &str) -> oneshot::Sender<Outcome> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().entry(city.to_string()).or_default().push_back(rx);
            tx
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherProvider for GatedProvider {
        async fn current_weather(&self, query: &Query) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gates.lock().unwrap().get_mut(query.as_str()).and_then(VecDeque::pop_front);
            match gate {
                Some(rx) => rx.await.unwrap_or_else(|_| Err(LookupError::transport("gate closed"))),
                None => Err(LookupError::transport("no gate")),
            }
        }
    }

    async fn let_tasks_run() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn controller() -> (Arc<GatedProvider>, LookupController) {
        let provider = Arc::new(GatedProvider::default());
        let controller = LookupController::new(provider.clone());
        (provider, controller)
    }

    #[test]
    fn stale_token_cannot_resolve() {
        let cell = StateCell::new();
        let first = AttemptToken::new(1);
        cell.begin(None);

        let second = AttemptToken::new(2);
        cell.begin(Some(&first));

        assert!(first.is_canceled());
        assert!(!cell.resolve(&first, Ok(report("Paris"))));
        assert_eq!(*cell.tx.borrow(), RequestState::Loading);

        assert!(cell.resolve(&second, Err(LookupError::NotFound)));
        assert_eq!(*cell.tx.borrow(), RequestState::Failed("City not found".into()));

        assert!(!cell.resolve(&first, Err(LookupError::Api(500))));
        assert_eq!(*cell.tx.borrow(), RequestState::Failed("City not found".into()));
    }

    #[test]
    fn canceled_token_is_discarded() {
        let cell = StateCell::new();
        let token = AttemptToken::new(1);
        cell.begin(None);
        cell.cancel(&token);

        assert!(!cell.resolve(&token, Ok(report("Rome"))));
        assert!(cell.tx.borrow().is_loading());
    }

    #[tokio::test]
    async fn submit_enters_loading_synchronously() {
        let (provider, mut controller) = controller();
        let _gate = provider.gate("London");

        assert_eq!(controller.state(), RequestState::Idle);
        assert!(controller.submit("  London "));
        assert!(controller.state().is_loading());
        assert_eq!(controller.query().map(Query::as_str), Some("London"));
    }

    #[tokio::test]
    async fn blank_submission_is_a_no_op() {
        let (provider, mut controller) = controller();

        assert!(!controller.submit("   "));
        let_tasks_run().await;

        assert_eq!(controller.state(), RequestState::Idle);
        assert!(controller.query().is_none());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn blank_submission_keeps_previous_result() {
        let (provider, mut controller) = controller();
        provider.gate("Oslo").send(Ok(report("Oslo"))).unwrap();

        controller.submit("Oslo");
        let settled = controller.settled().await;
        assert_eq!(settled.report().map(|r| r.location.as_str()), Some("Oslo"));

        assert!(!controller.submit("\t"));
        assert_eq!(controller.state(), settled);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn blank_submission_keeps_previous_error() {
        let (provider, mut controller) = controller();
        provider.gate("Atlantis").send(Err(LookupError::NotFound)).unwrap();

        controller.submit("Atlantis");
        let settled = controller.settled().await;
        assert_eq!(settled, RequestState::Failed("City not found".into()));

        let mut rx = controller.subscribe();
        assert!(!controller.submit("   "));
        assert_eq!(controller.state(), settled);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(controller.query().map(Query::as_str), Some("Atlantis"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn superseding_a_pending_lookup_notifies_loading_once() {
        let (provider, mut controller) = controller();
        let _paris = provider.gate("Paris");
        let rome = provider.gate("Rome");
        let mut rx = controller.subscribe();

        controller.submit("Paris");
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_loading());

        controller.submit("Rome");
        assert!(!rx.has_changed().unwrap());
        assert!(controller.state().is_loading());

        rome.send(Ok(report("Rome"))).unwrap();
        rx.changed().await.unwrap();
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.report().map(|r| r.location.as_str()), Some("Rome"));
    }

    #[tokio::test]
    async fn failure_message_is_surfaced() {
        let (provider, mut controller) = controller();
        provider.gate("Atlantis").send(Err(LookupError::transport("Network down"))).unwrap();

        controller.submit("Atlantis");
        assert_eq!(controller.settled().await, RequestState::Failed("Network down".into()));
    }

    #[tokio::test]
    async fn newer_submission_wins_over_older_one() {
        let (provider, mut controller) = controller();
        let paris = provider.gate("Paris");
        let rome = provider.gate("Rome");

        controller.submit("Paris");
        let_tasks_run().await;
        controller.submit("Rome");
        let_tasks_run().await;

        rome.send(Ok(report("Rome"))).unwrap();
        let settled = controller.settled().await;
        assert_eq!(settled.report().map(|r| r.location.as_str()), Some("Rome"));

        // The Paris task was aborted, so nobody is listening any more.
        assert!(paris.send(Ok(report("Paris"))).is_err());
        let_tasks_run().await;
        assert_eq!(controller.state(), settled);
    }

    #[tokio::test]
    async fn resubmitting_same_city_restarts_the_lookup() {
        let (provider, mut controller) = controller();
        let first = provider.gate("Lima");
        let second = provider.gate("Lima");

        controller.submit("Lima");
        let_tasks_run().await;
        controller.submit("Lima");
        let_tasks_run().await;

        assert_eq!(provider.calls(), 2);
        assert!(first.send(Err(LookupError::Api(500))).is_err());

        second.send(Ok(report("Lima"))).unwrap();
        assert!(controller.settled().await.report().is_some());
    }

    #[tokio::test]
    async fn submit_input_uses_the_input_text() {
        let (provider, mut controller) = controller();
        provider.gate("Kyiv").send(Ok(report("Kyiv"))).unwrap();

        controller.set_input(" Kyiv ");
        assert!(controller.submit_input());
        assert_eq!(controller.input(), " Kyiv ");

        let settled = controller.settled().await;
        assert_eq!(settled.report().map(|r| r.location.as_str()), Some("Kyiv"));
        // Input is preserved for correction and resubmission.
        assert_eq!(controller.input(), " Kyiv ");
    }

    #[tokio::test]
    async fn subscribers_see_each_transition() {
        let (provider, mut controller) = controller();
        let gate = provider.gate("Cairo");
        let mut rx = controller.subscribe();

        controller.submit("Cairo");
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_loading());

        gate.send(Err(LookupError::NotFound)).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), RequestState::Failed("City not found".into()));
    }

    #[tokio::test]
    async fn teardown_cancels_in_flight_lookup() {
        let (provider, mut controller) = controller();
        let gate = provider.gate("Tokyo");

        controller.submit("Tokyo");
        let_tasks_run().await;
        let mut rx = controller.subscribe();
        drop(controller);
        let_tasks_run().await;

        assert!(gate.send(Ok(report("Tokyo"))).is_err());
        assert!(rx.changed().await.is_err());
        assert!(rx.borrow().is_loading());
    }
}
