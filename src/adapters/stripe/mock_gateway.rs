//! Scriptable in-process [`PaymentGateway`] for tests and local runs.
//!
//! Records every call, hands out deterministic ids and lets a test inject
//! a failure for one named method.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::ports::{
    CheckoutSessionRequest, CreatedCheckoutSession, CustomerRequest, GatewayCheckoutSession,
    GatewayCustomer, PaymentError, PaymentGateway,
};

#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

#[derive(Default)]
struct MockState {
    customers_by_email: HashMap<String, GatewayCustomer>,
    sessions: HashMap<String, GatewayCheckoutSession>,
    checkout_requests: Vec<CheckoutSessionRequest>,
    method_errors: HashMap<String, PaymentError>,
    call_log: Vec<MethodCall>,
    counter: u64,
}

#[derive(Default, Clone)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every call to `method` fails with `error` until cleared.
    pub fn fail_method(&self, method: &str, error: PaymentError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        self.state().method_errors.clear();
    }

    /// Overrides what `retrieve_checkout_session` returns for `session.id`.
    pub fn set_session(&self, session: GatewayCheckoutSession) {
        self.state().sessions.insert(session.id.clone(), session);
    }

    /// Marks a session as paid, as if the customer finished the hosted page.
    pub fn complete_session(&self, session_id: &str) {
        if let Some(session) = self.state().sessions.get_mut(session_id) {
            session.status = Some("complete".into());
            session.payment_status = Some("paid".into());
        }
    }

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Checkout requests in the order received.
    pub fn checkout_requests(&self) -> Vec<CheckoutSessionRequest> {
        self.state().checkout_requests.clone()
    }

    fn begin(&self, method: &str, args: Vec<String>) -> Result<MutexGuard<'_, MockState>, PaymentError> {
        let mut state = self.state();
        state.call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
        if let Some(err) = state.method_errors.get(method) {
            return Err(err.clone());
        }
        Ok(state)
    }
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{}_mock_{}", prefix, self.counter)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn find_or_create_customer(
        &self,
        request: CustomerRequest,
    ) -> Result<GatewayCustomer, PaymentError> {
        let mut state = self.begin("find_or_create_customer", vec![request.email.clone()])?;
        let key = request.email.trim().to_lowercase();
        if let Some(existing) = state.customers_by_email.get(&key) {
            return Ok(existing.clone());
        }
        let customer = GatewayCustomer {
            id: state.next_id("cus"),
            email: Some(request.email),
        };
        state.customers_by_email.insert(key, customer.clone());
        Ok(customer)
    }

    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CreatedCheckoutSession, PaymentError> {
        let mut state = self.begin(
            "create_checkout_session",
            vec![request.client_reference_id.clone()],
        )?;
        let id = state.next_id("cs");
        let payment_intent = state.next_id("pi");
        state.sessions.insert(
            id.clone(),
            GatewayCheckoutSession {
                id: id.clone(),
                status: Some("open".into()),
                payment_status: Some("unpaid".into()),
                payment_intent: Some(payment_intent.clone()),
                customer: request.customer_id.clone(),
            },
        );
        state.checkout_requests.push(request);
        Ok(CreatedCheckoutSession {
            url: Some(format!("https://checkout.stripe.test/pay/{}", id)),
            id,
            payment_intent: Some(payment_intent),
            expires_at: None,
        })
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<GatewayCheckoutSession>, PaymentError> {
        let state = self.begin("retrieve_checkout_session", vec![session_id.to_string()])?;
        Ok(state.sessions.get(session_id).cloned())
    }

    async fn expire_checkout_session(&self, session_id: &str) -> Result<(), PaymentError> {
        let mut state = self.begin("expire_checkout_session", vec![session_id.to_string()])?;
        if let Some(session) = state.sessions.get_mut(session_id) {
            if session.status.as_deref() != Some("open") {
                return Err(PaymentError::invalid_request(
                    "Only Checkout Sessions with a status of `open` can be expired",
                ));
            }
            session.status = Some("expired".into());
        }
        Ok(())
    }

    async fn cancel_recurring_subscription(
        &self,
        gateway_subscription_id: &str,
    ) -> Result<(), PaymentError> {
        drop(self.begin(
            "cancel_recurring_subscription",
            vec![gateway_subscription_id.to_string()],
        )?);
        Ok(())
    }
}
