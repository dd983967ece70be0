//! In-memory collaborators for workflow tests

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{CheckoutError, Result};
use crate::notify::{Notice, NoticeLevel, Notifier};
use crate::order::{OrderRequest, OrderSessionResult};
use crate::purchase::{
    MemoryPurchaseStore, PurchaseDetails, PurchaseRecordWriter, StorePurchaseWriter,
};
use crate::requester::OrderSessionRequester;
use crate::sdk::{
    DropinConfig, HandoffCallbacks, PaymentSdk, RedirectCheckout, SdkLoader, SdkMode,
};

#[derive(Default)]
pub struct RecordingNotifier {
    notices: RefCell<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.borrow().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.notices
            .borrow()
            .iter()
            .filter(|n| n.level == NoticeLevel::Error)
            .map(|n| n.message.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.borrow_mut().push(notice);
    }
}

/// Replays canned backend replies and records every request
#[derive(Default)]
pub struct ScriptedRequester {
    replies: RefCell<VecDeque<OrderSessionResult>>,
    requests: RefCell<Vec<OrderRequest>>,
}

impl ScriptedRequester {
    pub fn reply(&self, result: OrderSessionResult) {
        self.replies.borrow_mut().push_back(result);
    }

    pub fn requests(&self) -> Vec<OrderRequest> {
        self.requests.borrow().clone()
    }
}

#[async_trait(?Send)]
impl OrderSessionRequester for ScriptedRequester {
    async fn create_order_session(&self, request: &OrderRequest) -> OrderSessionResult {
        self.requests.borrow_mut().push(request.clone());
        tokio::task::yield_now().await;
        self.replies.borrow_mut().pop_front().unwrap_or_else(|| {
            OrderSessionResult::failed(request.order_id().as_str(), "no scripted reply")
        })
    }
}

/// Records handoffs; drop-in callbacks are kept so tests can fire them
#[derive(Default)]
pub struct FakeSdk {
    checkouts: RefCell<Vec<RedirectCheckout>>,
    dropins: RefCell<Vec<(String, String)>>,
    callbacks: RefCell<Vec<Rc<dyn HandoffCallbacks>>>,
    reject_with: RefCell<Option<String>>,
}

impl FakeSdk {
    pub fn checkouts(&self) -> Vec<RedirectCheckout> {
        self.checkouts.borrow().clone()
    }

    /// (container, order token) per mount
    pub fn dropins(&self) -> Vec<(String, String)> {
        self.dropins.borrow().clone()
    }

    pub fn last_callbacks(&self) -> Rc<dyn HandoffCallbacks> {
        Rc::clone(self.callbacks.borrow().last().expect("drop-in was mounted"))
    }

    pub fn reject_next(&self, message: &str) {
        *self.reject_with.borrow_mut() = Some(message.into());
    }

    fn rejection(&self) -> Result<()> {
        match self.reject_with.borrow_mut().take() {
            Some(message) => Err(CheckoutError::Handoff(message)),
            None => Ok(()),
        }
    }
}

impl PaymentSdk for FakeSdk {
    fn checkout(&self, options: RedirectCheckout) -> Result<()> {
        self.rejection()?;
        self.checkouts.borrow_mut().push(options);
        Ok(())
    }

    fn dropin(&self, container: &str, config: DropinConfig) -> Result<()> {
        self.rejection()?;
        self.dropins
            .borrow_mut()
            .push((container.to_string(), config.order_token.clone()));
        self.callbacks.borrow_mut().push(config.callbacks);
        Ok(())
    }
}

pub struct FakeLoader {
    sdk: Rc<FakeSdk>,
    loads: Cell<u32>,
    failures: RefCell<VecDeque<String>>,
    stalls: Cell<u32>,
}

impl FakeLoader {
    pub fn new(sdk: Rc<FakeSdk>) -> Self {
        Self {
            sdk,
            loads: Cell::new(0),
            failures: RefCell::new(VecDeque::new()),
            stalls: Cell::new(0),
        }
    }

    pub fn fail_next(&self, message: &str) {
        self.failures.borrow_mut().push_back(message.into());
    }

    /// The next load never completes
    pub fn stall_next(&self) {
        self.stalls.set(self.stalls.get() + 1);
    }

    pub fn loads(&self) -> u32 {
        self.loads.get()
    }
}

#[async_trait(?Send)]
impl SdkLoader for FakeLoader {
    async fn load(&self, _mode: SdkMode) -> Result<Rc<dyn PaymentSdk>> {
        self.loads.set(self.loads.get() + 1);
        if self.stalls.get() > 0 {
            self.stalls.set(self.stalls.get() - 1);
            std::future::pending::<()>().await;
        }
        tokio::task::yield_now().await;
        let failure = self.failures.borrow_mut().pop_front();
        match failure {
            Some(message) => Err(CheckoutError::SdkUnavailable(message)),
            None => Ok(self.sdk.clone() as Rc<dyn PaymentSdk>),
        }
    }
}

/// Store-backed writer that can be told to fail
pub struct FlakyWriter {
    inner: StorePurchaseWriter<MemoryPurchaseStore>,
    failures: Cell<u32>,
}

impl FlakyWriter {
    pub fn new(store: Arc<MemoryPurchaseStore>) -> Self {
        Self {
            inner: StorePurchaseWriter::new(store),
            failures: Cell::new(0),
        }
    }

    pub fn fail_next(&self) {
        self.failures.set(self.failures.get() + 1);
    }
}

#[async_trait(?Send)]
impl PurchaseRecordWriter for FlakyWriter {
    async fn record_purchase(
        &self,
        buyer_id: &str,
        item_id: &str,
        details: PurchaseDetails,
    ) -> Result<()> {
        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(CheckoutError::Storage("record store offline".into()));
        }
        self.inner.record_purchase(buyer_id, item_id, details).await
    }
}
