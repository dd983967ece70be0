//! Payment Handoff Controller
//!
//! Drives one checkout from form submission to provider handoff:
//!
//! ```text
//! Idle ──submit──▶ AwaitingSession ──token──▶ HandoffInProgress ──callback──▶ Succeeded
//!  ▲                     │                          │
//!  └──cancel─────────────┴──────── Failed ◀─────────┘
//! ```
//!
//! The controller owns the buyer form and the current attempt. Order session
//! replies and drop-in callbacks are tagged with the attempt that produced
//! them; anything tagged with an older attempt is dropped.

use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::buyer::{BuyerDetails, BuyerField, validate};
use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, Result};
use crate::item::Item;
use crate::notify::{Notice, Notifier};
use crate::order::{GENERIC_SESSION_ERROR, OrderRequest, OrderSessionResult};
use crate::purchase::PurchaseRecordWriter;
use crate::requester::OrderSessionRequester;
use crate::sdk::{
    DropinConfig, HandoffCallbacks, PaymentFailure, PaymentSuccess, RedirectCheckout, SdkHandle,
};
use crate::success::{CheckoutStash, PendingCheckout, SuccessReturn};

const PAYMENT_SUCCESS_NOTICE: &str = "Payment successful!";
const DEFAULT_FAILURE_REASON: &str = "Payment could not be completed";

/// How the provider collects payment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffMode {
    /// Provider takes over the page
    #[default]
    Redirect,
    /// Drop-in widget inside the page
    Embedded,
}

/// What the buyer has to do after a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryAction {
    /// Submit the form again (requests a fresh session)
    Resubmit,
    /// Reload the payment SDK first
    ReloadSdk,
    /// Payment went through; save the purchase again for the same order
    RecordPurchase,
}

/// Checkout state exposed to the UI
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutPhase {
    Idle,
    AwaitingSession,
    HandoffInProgress {
        mode: HandoffMode,
        order_id: String,
        payment_session_id: String,
    },
    Succeeded {
        order_id: String,
        /// Success view to navigate to
        location: String,
    },
    Failed {
        error: CheckoutError,
        retry: RetryAction,
    },
}

impl CheckoutPhase {
    pub const fn accepts_submit(&self) -> bool {
        matches!(
            self,
            Self::Idle
                | Self::Failed {
                    retry: RetryAction::Resubmit,
                    ..
                }
        )
    }
}

/// Drop-in callback, translated
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderEvent {
    Success(PaymentSuccess),
    Failure(PaymentFailure),
}

/// Callbacks handed to the drop-in; they only forward into the controller
struct ChannelCallbacks {
    attempt: u64,
    tx: mpsc::UnboundedSender<(u64, ProviderEvent)>,
}

impl ChannelCallbacks {
    fn forward(&self, event: ProviderEvent) {
        if self.tx.send((self.attempt, event)).is_err() {
            tracing::debug!(attempt = self.attempt, "Checkout gone, dropping provider callback");
        }
    }
}

impl HandoffCallbacks for ChannelCallbacks {
    fn on_success(&self, data: PaymentSuccess) {
        self.forward(ProviderEvent::Success(data));
    }

    fn on_failure(&self, error: PaymentFailure) {
        self.forward(ProviderEvent::Failure(error));
    }
}

/// Commands from the UI to a running controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutCommand {
    Input(BuyerField, String),
    Submit,
    Cancel,
    RetrySdk,
    RetryRecord,
    Teardown,
}

/// Everything the controller talks to
#[derive(Clone)]
pub struct Collaborators {
    pub sdk: Rc<SdkHandle>,
    pub requester: Rc<dyn OrderSessionRequester>,
    pub writer: Rc<dyn PurchaseRecordWriter>,
    pub stash: Rc<dyn CheckoutStash>,
    pub notifier: Rc<dyn Notifier>,
}

/// Reply to an order session request started by [`CheckoutController::begin_submit`]
pub struct SessionReply {
    attempt: u64,
    request: OrderRequest,
    outcome: Result<OrderSessionResult>,
}

impl SessionReply {
    pub const fn attempt(&self) -> u64 {
        self.attempt
    }
}

/// Session currently handed (or about to be handed) to the provider
struct ActiveSession {
    request: OrderRequest,
    order_id: String,
    payment_session_id: String,
    handed_off: bool,
}

impl ActiveSession {
    fn pending(&self) -> PendingCheckout {
        PendingCheckout {
            order_id: self.order_id.clone(),
            item: self.request.item().clone(),
            buyer_key: self.request.buyer_key().to_string(),
            payment_session_id: self.payment_session_id.clone(),
        }
    }

    fn success_return(&self) -> SuccessReturn {
        let item = self.request.item();
        SuccessReturn::new(&self.order_id, item.kind, &item.id)
    }
}

/// Checkout state machine for one item
pub struct CheckoutController {
    item: Item,
    buyer_id: Option<String>,
    form: BuyerDetails,
    config: CheckoutConfig,
    deps: Collaborators,
    phase: watch::Sender<CheckoutPhase>,
    attempt: u64,
    session: Option<ActiveSession>,
    events_tx: mpsc::UnboundedSender<(u64, ProviderEvent)>,
    events_rx: mpsc::UnboundedReceiver<(u64, ProviderEvent)>,
}

impl CheckoutController {
    pub fn new(item: Item, deps: Collaborators, config: CheckoutConfig) -> Self {
        let (phase, _) = watch::channel(CheckoutPhase::Idle);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            item,
            buyer_id: None,
            form: BuyerDetails::default(),
            config,
            deps,
            phase,
            attempt: 0,
            session: None,
            events_tx,
            events_rx,
        }
    }

    /// Signed-in buyer; guests are keyed by email
    #[must_use]
    pub fn with_buyer_id(mut self, buyer_id: impl Into<String>) -> Self {
        self.buyer_id = Some(buyer_id.into());
        self
    }

    pub const fn item(&self) -> &Item {
        &self.item
    }

    pub fn phase(&self) -> CheckoutPhase {
        self.phase.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CheckoutPhase> {
        self.phase.subscribe()
    }

    pub const fn form(&self) -> &BuyerDetails {
        &self.form
    }

    pub fn input(&mut self, field: BuyerField, value: impl Into<String>) {
        self.form.set(field, value);
    }

    pub fn submit_enabled(&self) -> bool {
        self.phase.borrow().accepts_submit()
    }

    /// Validate, request a session and hand off, all in one call
    pub async fn submit(&mut self) -> CheckoutPhase {
        match self.begin_submit() {
            Some(request) => {
                let reply = request.await;
                self.complete_submit(reply)
            }
            None => self.phase(),
        }
    }

    /// Start a submit attempt
    ///
    /// Returns `None` when submission is not allowed or the form is invalid.
    /// The returned future waits for the SDK and then makes the single order
    /// request; feed its output to [`Self::complete_submit`].
    pub fn begin_submit(&mut self) -> Option<LocalBoxFuture<'static, SessionReply>> {
        if !self.submit_enabled() {
            tracing::debug!(phase = ?self.phase(), "Submit ignored");
            return None;
        }

        if let Err(e) = validate(&self.form) {
            self.deps.notifier.notify(Notice::error(e.to_string()));
            return None;
        }

        let request = match OrderRequest::new(
            self.item.clone(),
            self.form.clone(),
            self.buyer_id.clone(),
        ) {
            Ok(request) => request,
            Err(e) => {
                self.fail(e, RetryAction::Resubmit);
                return None;
            }
        };

        self.attempt += 1;
        self.discard_session();
        self.set_phase(CheckoutPhase::AwaitingSession);

        tracing::info!(
            attempt = self.attempt,
            order_id = %request.order_id(),
            item_id = %self.item.id,
            "Requesting payment session"
        );

        let attempt = self.attempt;
        let sdk = Rc::clone(&self.deps.sdk);
        let requester = Rc::clone(&self.deps.requester);
        Some(
            async move {
                let outcome = match sdk.ready().await {
                    Ok(_) => Ok(requester.create_order_session(&request).await),
                    Err(e) => Err(e),
                };
                SessionReply {
                    attempt,
                    request,
                    outcome,
                }
            }
            .boxed_local(),
        )
    }

    /// Apply an order session reply
    pub fn complete_submit(&mut self, reply: SessionReply) -> CheckoutPhase {
        if reply.attempt != self.attempt || self.phase() != CheckoutPhase::AwaitingSession {
            tracing::debug!(
                attempt = reply.attempt,
                current = self.attempt,
                "Ignoring stale session reply"
            );
            return self.phase();
        }

        let result = match reply.outcome {
            Ok(result) => result,
            Err(e) => {
                self.fail(e, RetryAction::ReloadSdk);
                return self.phase();
            }
        };

        let token = match result.payment_session_id {
            Some(token) if result.success && !token.is_empty() => token,
            _ => {
                let message = result
                    .error
                    .unwrap_or_else(|| GENERIC_SESSION_ERROR.to_string());
                self.fail(CheckoutError::SessionRequest(message), RetryAction::Resubmit);
                return self.phase();
            }
        };

        self.session = Some(ActiveSession {
            request: reply.request,
            order_id: result.order_id.clone(),
            payment_session_id: token.clone(),
            handed_off: false,
        });
        self.set_phase(CheckoutPhase::HandoffInProgress {
            mode: self.config.handoff_mode,
            order_id: result.order_id,
            payment_session_id: token,
        });

        self.resume_handoff()
    }

    /// Invoke the provider for the current session, at most once per token
    pub fn resume_handoff(&mut self) -> CheckoutPhase {
        let Some(session) = self.session.as_ref() else {
            return self.phase();
        };
        if session.handed_off {
            return self.phase();
        }

        let Some(sdk) = self.deps.sdk.get() else {
            self.fail(
                CheckoutError::SdkUnavailable("payment SDK is not loaded".into()),
                RetryAction::ReloadSdk,
            );
            return self.phase();
        };

        if let Err(e) = self.deps.stash.save(session.pending()) {
            self.fail(e, RetryAction::Resubmit);
            return self.phase();
        }

        let order_id = session.order_id.clone();
        let token = session.payment_session_id.clone();
        if let Some(session) = self.session.as_mut() {
            session.handed_off = true;
        }

        let handed = match self.config.handoff_mode {
            HandoffMode::Redirect => sdk.checkout(RedirectCheckout {
                payment_session_id: token,
                redirect_target: self.config.redirect_target,
            }),
            HandoffMode::Embedded => sdk.dropin(
                &self.config.dropin_container,
                DropinConfig {
                    components: self.config.dropin_components.clone(),
                    order_token: token,
                    style: self.config.dropin_style.clone(),
                    callbacks: Rc::new(ChannelCallbacks {
                        attempt: self.attempt,
                        tx: self.events_tx.clone(),
                    }),
                },
            ),
        };

        match handed {
            Ok(()) => {
                tracing::info!(
                    order_id = %order_id,
                    mode = ?self.config.handoff_mode,
                    "Handed off to payment provider"
                );
                if self.config.handoff_mode == HandoffMode::Redirect {
                    self.form.clear();
                }
            }
            Err(e) => self.fail_handoff(e),
        }
        self.phase()
    }

    /// Next drop-in callback, tagged with its attempt
    pub async fn next_provider_event(&mut self) -> Option<(u64, ProviderEvent)> {
        self.events_rx.recv().await
    }

    /// Apply a drop-in callback
    pub async fn handle_provider_event(&mut self, attempt: u64, event: ProviderEvent) -> CheckoutPhase {
        let in_handoff = matches!(
            self.phase(),
            CheckoutPhase::HandoffInProgress {
                mode: HandoffMode::Embedded,
                ..
            }
        );
        if attempt != self.attempt || !in_handoff {
            tracing::debug!(attempt, current = self.attempt, "Ignoring stale provider callback");
            return self.phase();
        }
        let Some(session) = self.session.as_ref() else {
            return self.phase();
        };

        match event {
            ProviderEvent::Success(data) => {
                if data.order.order_id != session.order_id {
                    tracing::warn!(
                        expected = %session.order_id,
                        got = %data.order.order_id,
                        "Success callback for a different order"
                    );
                    return self.phase();
                }

                self.deps
                    .notifier
                    .notify(Notice::success(PAYMENT_SUCCESS_NOTICE));
                self.confirm_paid().await;
            }
            ProviderEvent::Failure(error) => {
                let reason = if error.message.trim().is_empty() {
                    DEFAULT_FAILURE_REASON.to_string()
                } else {
                    error.message
                };
                self.fail_handoff(CheckoutError::Handoff(reason));
            }
        }
        self.phase()
    }

    /// Save the purchase for a paid order whose first write failed
    ///
    /// The session and its stash entry are kept until this succeeds.
    pub async fn retry_record(&mut self) -> CheckoutPhase {
        if !self.awaiting_record() {
            return self.phase();
        }
        self.confirm_paid().await;
        self.phase()
    }

    /// Abandon the current attempt
    ///
    /// Ignored once the payment went through; the purchase still has to be
    /// saved.
    pub fn cancel(&mut self) {
        if self.awaiting_record() {
            tracing::debug!("Cancel ignored, paid order not yet recorded");
            return;
        }
        self.attempt += 1;
        self.discard_session();
        self.set_phase(CheckoutPhase::Idle);
    }

    /// Reload a failed SDK; back to `Idle` when it loads
    pub async fn retry_sdk(&mut self) -> CheckoutPhase {
        if !matches!(
            self.phase(),
            CheckoutPhase::Failed {
                retry: RetryAction::ReloadSdk,
                ..
            }
        ) {
            return self.phase();
        }

        match self.deps.sdk.reload().await {
            Ok(_) => self.set_phase(CheckoutPhase::Idle),
            Err(e) => self.fail(e, RetryAction::ReloadSdk),
        }
        self.phase()
    }

    /// Component unmount
    pub fn teardown(&mut self) {
        self.attempt += 1;
        self.session = None;
        self.form.clear();
        self.set_phase(CheckoutPhase::Idle);
    }

    /// Drive the controller from UI commands until teardown
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<CheckoutCommand>) {
        let mut in_flight: Option<LocalBoxFuture<'static, SessionReply>> = None;

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(CheckoutCommand::Input(field, value)) => self.input(field, value),
                    Some(CheckoutCommand::Submit) => {
                        if let Some(request) = self.begin_submit() {
                            in_flight = Some(request);
                        }
                    }
                    Some(CheckoutCommand::Cancel) => {
                        self.cancel();
                        in_flight = None;
                    }
                    Some(CheckoutCommand::RetrySdk) => {
                        self.retry_sdk().await;
                    }
                    Some(CheckoutCommand::RetryRecord) => {
                        self.retry_record().await;
                    }
                    Some(CheckoutCommand::Teardown) | None => {
                        self.teardown();
                        break;
                    }
                },
                reply = async {
                    match in_flight.as_mut() {
                        Some(request) => request.await,
                        None => std::future::pending().await,
                    }
                }, if in_flight.is_some() => {
                    in_flight = None;
                    self.complete_submit(reply);
                }
                Some((attempt, event)) = self.events_rx.recv() => {
                    self.handle_provider_event(attempt, event).await;
                }
            }
        }
    }

    fn awaiting_record(&self) -> bool {
        matches!(
            self.phase(),
            CheckoutPhase::Failed {
                retry: RetryAction::RecordPurchase,
                ..
            }
        )
    }

    /// Record the purchase for the current, paid session
    async fn confirm_paid(&mut self) {
        let Some(success) = self.session.as_ref().map(ActiveSession::success_return) else {
            return;
        };
        let confirmed = success
            .confirm(self.deps.stash.as_ref(), self.deps.writer.as_ref())
            .await;

        match confirmed {
            Ok(_) => {
                self.form.clear();
                self.session = None;
                self.set_phase(CheckoutPhase::Succeeded {
                    order_id: success.order_id.clone(),
                    location: success.location(),
                });
            }
            Err(e) => {
                tracing::error!(order_id = %success.order_id, error = %e, "Purchase not recorded");
                self.fail(e, RetryAction::RecordPurchase);
            }
        }
    }

    fn set_phase(&self, phase: CheckoutPhase) {
        self.phase.send_replace(phase);
    }

    fn fail(&mut self, error: CheckoutError, retry: RetryAction) {
        tracing::warn!(error = %error, ?retry, "Checkout failed");
        self.deps.notifier.notify(Notice::error(error.user_message()));
        self.set_phase(CheckoutPhase::Failed { error, retry });
    }

    /// The token is spent; a retry must request a fresh session
    fn fail_handoff(&mut self, error: CheckoutError) {
        self.discard_session();
        self.fail(error, RetryAction::Resubmit);
    }

    fn discard_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = self.deps.stash.remove(&session.order_id) {
                tracing::warn!(order_id = %session.order_id, error = %e, "Could not clear pending checkout");
            }
        }
    }
}
