//! The autosave controller

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use watom_core::{AutosaveConfig, AutosaveEvent, Config, EventBus, Result, WatomError};

use crate::dom::{EditForm, HostPage, PageCollaborators, PreviewSurface, SaveButton};
use crate::links;
use crate::protocol::{
    SaveOutcome, SaveRequest, SaveResponse, SaveResult, SubmitOutcome, TransportResponse,
};
use crate::scheduler::DebounceScheduler;
use crate::transport::SaveTransport;
use crate::AutosaveError;

/// Bookkeeping for requests on the wire
#[derive(Debug, Default)]
struct SaveGate {
    in_flight: usize,
    resave_requested: bool,
}

impl SaveGate {
    /// Claim a slot for a new request; with `serialize` only one slot exists
    fn enter(&mut self, serialize: bool) -> bool {
        if serialize && self.in_flight > 0 {
            self.resave_requested = true;
            return false;
        }
        self.in_flight += 1;
        true
    }

    /// Give the slot back, unless a deferred save is waiting for it
    fn finish(&mut self) -> bool {
        if self.resave_requested {
            self.resave_requested = false;
            return true;
        }
        self.in_flight = self.in_flight.saturating_sub(1);
        false
    }
}

struct ControllerInner {
    config: AutosaveConfig,
    form: EditForm,
    save_button: Arc<dyn SaveButton>,
    preview: Arc<dyn PreviewSurface>,
    transport: Arc<dyn SaveTransport>,
    event_bus: Option<Arc<dyn EventBus>>,
    scheduler: DebounceScheduler,
    gate: Mutex<SaveGate>,
    /// Signalled whenever a request slot is given back
    slot_released: Notify,
}

/// Debounces edits into quick saves and applies the server's answer
///
/// Cloning is cheap; every clone drives the same page.
#[derive(Clone)]
pub struct AutosaveController {
    inner: Arc<ControllerInner>,
}

impl AutosaveController {
    /// Create a controller over explicit collaborators
    pub fn new(
        collaborators: PageCollaborators,
        transport: Arc<dyn SaveTransport>,
        config: AutosaveConfig,
        event_bus: Option<Arc<dyn EventBus>>,
    ) -> Self {
        let scheduler = DebounceScheduler::new(config.quiet_period());

        Self {
            inner: Arc::new(ControllerInner {
                config,
                form: collaborators.form,
                save_button: collaborators.save_button,
                preview: collaborators.preview,
                transport,
                event_bus,
                scheduler,
                gate: Mutex::new(SaveGate::default()),
                slot_released: Notify::new(),
            }),
        }
    }

    /// Find the collaborators on `page` and wire their events to a new controller
    ///
    /// Returns `Ok(None)` when the page carries no edit form. A page with the form
    /// but without the save button or preview is malformed.
    pub fn bootstrap(
        page: &dyn HostPage,
        transport: Arc<dyn SaveTransport>,
        config: &Config,
        event_bus: Option<Arc<dyn EventBus>>,
    ) -> Result<Option<Self>> {
        let selectors = &config.selectors;

        let Some(form) = page.form(&selectors.form_name) else {
            debug!("No '{}' form on page, autosave disabled", selectors.form_name);
            return Ok(None);
        };

        let missing = |what: String| WatomError::from(AutosaveError::MissingElement(what));

        let new_content = form.field(&selectors.new_content_field).ok_or_else(|| {
            missing(format!("field '{}' in form", selectors.new_content_field))
        })?;
        let old_content = form.field(&selectors.old_content_field).ok_or_else(|| {
            missing(format!("field '{}' in form", selectors.old_content_field))
        })?;
        let save_button = page
            .button_by_id(&selectors.save_button_id)
            .ok_or_else(|| missing(format!("#{}", selectors.save_button_id)))?;
        let preview = page
            .preview_by_selector(&selectors.preview_selector)
            .ok_or_else(|| missing(selectors.preview_selector.clone()))?;

        let collaborators = PageCollaborators {
            form: EditForm {
                new_content,
                old_content,
                submitter: form.submitter(),
            },
            save_button,
            preview,
        };

        let controller = Self::new(
            collaborators,
            transport,
            config.autosave.clone(),
            event_bus,
        );
        controller.wire();

        info!("Autosave enabled for '{}'", selectors.form_name);
        Ok(Some(controller))
    }

    fn wire(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.form.new_content.on_input(Arc::new(move || {
            if let Some(controller) = Self::upgrade(&weak) {
                controller.notify_edit();
            }
        }));

        let weak = Arc::downgrade(&self.inner);
        self.inner.save_button.on_click(Arc::new(move || {
            if let Some(controller) = Self::upgrade(&weak) {
                tokio::spawn(async move {
                    if let Err(e) = controller.manual_save().await {
                        error!("Form submission failed: {}", e);
                    }
                });
            }
        }));

        let weak = Arc::downgrade(&self.inner);
        self.inner.preview.on_load(Arc::new(move || {
            if let Some(controller) = Self::upgrade(&weak) {
                controller.disable_links();
            }
        }));

        // The preview's first load happened before anyone was listening
        self.disable_links();
    }

    fn upgrade(weak: &Weak<ControllerInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn config(&self) -> &AutosaveConfig {
        &self.inner.config
    }

    pub fn form(&self) -> &EditForm {
        &self.inner.form
    }

    /// Whether a debounced save is armed
    pub fn has_pending_save(&self) -> bool {
        self.inner.scheduler.has_pending()
    }

    /// Number of save requests currently on the wire
    pub fn in_flight(&self) -> usize {
        self.inner.gate.lock().in_flight
    }

    /// Whether the save button shows the saving marker
    pub fn is_saving(&self) -> bool {
        self.inner
            .save_button
            .has_class(&self.inner.config.saving_class)
    }

    /// Record an edit: supersede any armed save and arm a new one after the quiet window
    pub fn notify_edit(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.scheduler.schedule(async move {
            if let Some(controller) = Self::upgrade(&weak) {
                let outcome = controller.save().await;
                debug!("Debounced save finished: {:?}", outcome);
            }
        });

        let delay = self.inner.scheduler.quiet_period();
        debug!("Save scheduled in {:?}", delay);
        self.emit(AutosaveEvent::save_scheduled(delay.as_millis() as u64));
    }

    /// Disarm the debounced save, if any
    pub fn cancel_pending(&self) -> bool {
        self.inner.scheduler.cancel_pending()
    }

    /// Wait until no save request is on the wire, including replays of deferred saves
    pub async fn flush(&self) {
        loop {
            // Registered before the check so a release in between is not missed
            let released = self.inner.slot_released.notified();
            if self.in_flight() == 0 {
                return;
            }
            released.await;
        }
    }

    /// Final save before shutdown: disarm the timer, drain in-flight requests, then
    /// send whatever the baseline still lacks
    pub async fn shutdown_save(&self) -> SaveOutcome {
        self.cancel_pending();
        self.flush().await;
        self.save().await
    }

    /// Send the edit buffer if it differs from the baseline and apply the answer
    pub async fn save(&self) -> SaveOutcome {
        let Some(request) = self.pending_request() else {
            debug!("Content matches baseline, nothing to save");
            self.publish(AutosaveEvent::save_skipped()).await;
            return SaveOutcome::Unchanged;
        };

        let entered = self
            .inner
            .gate
            .lock()
            .enter(self.inner.config.serialize_saves);
        if !entered {
            debug!("Save deferred until the in-flight request completes");
            self.publish(AutosaveEvent::save_deferred()).await;
            return SaveOutcome::Deferred;
        }

        let mut outcome = self.send(request).await;

        // Replay saves that were deferred while this one was on the wire
        loop {
            let replay = self.inner.gate.lock().finish();
            if !replay {
                self.inner.slot_released.notify_waiters();
                break;
            }
            match self.pending_request() {
                Some(request) => outcome = self.send(request).await,
                None => self.publish(AutosaveEvent::save_skipped()).await,
            }
        }

        outcome
    }

    fn pending_request(&self) -> Option<SaveRequest> {
        let new_content = self.inner.form.new_content.value();
        let old_content = self.inner.form.old_content.value();
        (new_content != old_content).then(|| SaveRequest::new(new_content, old_content))
    }

    async fn send(&self, request: SaveRequest) -> SaveOutcome {
        let request_id = Uuid::new_v4();
        let bytes = request.new_content.len();

        self.inner
            .save_button
            .add_class(&self.inner.config.saving_class);
        self.publish(AutosaveEvent::saving_indicator(true)).await;

        info!("Sending save request {} ({} bytes)", request_id, bytes);
        self.publish(AutosaveEvent::save_sent(request_id, bytes))
            .await;

        let put = self.inner.transport.put(&request);
        let completion = match self.inner.config.request_timeout() {
            Some(limit) => match tokio::time::timeout(limit, put).await {
                Ok(completion) => completion,
                Err(_) => Err(AutosaveError::RequestTimedOut(limit).into()),
            },
            None => put.await,
        };

        self.handle_response(request_id, completion).await
    }

    /// Apply the completion of a save request to the page
    ///
    /// The preview is reloaded once per completion, not on each readiness change
    /// of the request.
    async fn handle_response(
        &self,
        request_id: Uuid,
        completion: Result<TransportResponse>,
    ) -> SaveOutcome {
        self.inner.preview.reload();
        self.publish(AutosaveEvent::preview_reloaded()).await;

        let response = match completion {
            Ok(response) => response,
            Err(e) => {
                warn!("Save request {} failed: {}", request_id, e);
                self.publish(AutosaveEvent::save_failed(
                    request_id,
                    e.to_string(),
                    e.severity(),
                ))
                .await;
                return SaveOutcome::Failed;
            }
        };

        if !response.is_success() {
            let e = WatomError::from(AutosaveError::UnexpectedStatus(response.status));
            warn!("Save request {} rejected: {}", request_id, e);
            self.publish(AutosaveEvent::save_failed(
                request_id,
                e.to_string(),
                e.severity(),
            ))
            .await;
            return SaveOutcome::Rejected {
                status: response.status,
            };
        }

        let parsed = match SaveResponse::parse(&response.body) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("Save request {} returned {}", request_id, e);
                self.publish(AutosaveEvent::save_failed(
                    request_id,
                    e.to_string(),
                    e.severity(),
                ))
                .await;
                self.clear_saving_marker().await;
                return SaveOutcome::Invalid;
            }
        };

        self.inner
            .form
            .old_content
            .set_value(&parsed.updated_content);

        match parsed.result {
            SaveResult::Ok => {
                info!("Save request {} applied", request_id);
                self.publish(AutosaveEvent::saved(request_id)).await;
            }
            SaveResult::Conflicted => {
                // Server wins: local edits are replaced without a merge
                self.inner
                    .form
                    .new_content
                    .set_value(&parsed.updated_content);
                warn!(
                    "Save request {} conflicted, local content replaced by server version",
                    request_id
                );
                self.publish(AutosaveEvent::conflict(request_id)).await;
            }
        }

        self.schedule_marker_reset();
        SaveOutcome::Applied(parsed.result)
    }

    fn schedule_marker_reset(&self) {
        let weak = Arc::downgrade(&self.inner);
        let linger = self.inner.config.saving_linger();

        tokio::spawn(async move {
            tokio::time::sleep(linger).await;
            if let Some(controller) = Self::upgrade(&weak) {
                // A newer request owns the marker until its own answer arrives
                if controller.in_flight() == 0 {
                    controller.clear_saving_marker().await;
                }
            }
        });
    }

    async fn clear_saving_marker(&self) {
        self.inner
            .save_button
            .remove_class(&self.inner.config.saving_class);
        self.publish(AutosaveEvent::saving_indicator(false)).await;
    }

    /// Neutralize navigation on every link of the loaded preview
    pub fn disable_links(&self) -> usize {
        let count = links::disable_links(self.inner.preview.as_ref());
        debug!("Disabled {} preview links", count);
        self.emit(AutosaveEvent::links_disabled(count));
        count
    }

    /// Submit the form through the navigational path, bypassing quick saves
    pub async fn manual_save(&self) -> Result<SubmitOutcome> {
        // A full submission leaves the page, taking any armed timer with it
        self.cancel_pending();

        let submission = self.inner.form.submission();
        info!(
            "Submitting edit form ({} bytes)",
            submission.new_content.len()
        );

        let outcome = self.inner.form.submitter.submit(submission).await?;
        self.publish(AutosaveEvent::form_submitted()).await;

        if outcome.is_conflicted() {
            warn!("Form submission conflicted, server redirected to the edit view");
        }
        Ok(outcome)
    }

    async fn publish(&self, event: AutosaveEvent) {
        if let Some(bus) = &self.inner.event_bus {
            if let Err(e) = bus.publish(event).await {
                warn!("Failed to publish autosave event: {}", e);
            }
        }
    }

    /// Publish from a synchronous context
    fn emit(&self, event: AutosaveEvent) {
        if let Some(bus) = &self.inner.event_bus {
            let bus = Arc::clone(bus);
            tokio::spawn(async move {
                if let Err(e) = bus.publish(event).await {
                    warn!("Failed to publish autosave event: {}", e);
                }
            });
        }
    }
}

impl std::fmt::Debug for AutosaveController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutosaveController")
            .field("config", &self.inner.config)
            .field("pending_save", &self.has_pending_save())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::TextField;
    use crate::memory::{MemoryEditPage, ScriptedTransport};
    use crate::protocol::FormSubmission;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::sleep;
    use watom_core::{AutosaveEventHandler, InMemoryEventBus};

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn controller_for(
        page: &MemoryEditPage,
        transport: &Arc<ScriptedTransport>,
        config: AutosaveConfig,
    ) -> AutosaveController {
        AutosaveController::new(page.collaborators(), transport.clone(), config, None)
    }

    fn bootstrapped(
        page: &MemoryEditPage,
        transport: &Arc<ScriptedTransport>,
    ) -> AutosaveController {
        AutosaveController::bootstrap(page, transport.clone(), &Config::new(), None)
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_equal_buffers_send_nothing() {
        let page = MemoryEditPage::new("same");
        let transport = Arc::new(ScriptedTransport::new());
        let controller = controller_for(&page, &transport, AutosaveConfig::default());

        assert_eq!(controller.save().await, SaveOutcome::Unchanged);
        assert_eq!(transport.request_count(), 0);
        assert!(!controller.is_saving());
        assert_eq!(page.preview.reload_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_edits_collapse_into_one_save() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::new());
        let _controller = bootstrapped(&page, &transport);

        for text in ["AB", "ABC", "ABCD"] {
            page.new_content.type_text(text);
            sleep(Duration::from_millis(500)).await;
        }

        // Last edit at t=1000ms; the save fires at t=3000ms
        sleep(Duration::from_millis(1499)).await;
        assert_eq!(transport.request_count(), 0);

        sleep(Duration::from_millis(2)).await;
        settle().await;
        assert_eq!(transport.requests(), vec![SaveRequest::new("ABCD", "A")]);

        sleep(Duration::from_millis(10_000)).await;
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ok_scenario() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::gated());
        transport.push_save_response(SaveResult::Ok, "AB");
        let controller = bootstrapped(&page, &transport);

        page.new_content.type_text("AB");
        sleep(Duration::from_millis(2001)).await;
        settle().await;

        // Marker is up as soon as the request is issued
        assert_eq!(transport.requests(), vec![SaveRequest::new("AB", "A")]);
        assert!(controller.is_saving());
        assert_eq!(controller.in_flight(), 1);

        transport.release(1);
        settle().await;

        assert_eq!(page.old_content.value(), "AB");
        assert_eq!(page.new_content.value(), "AB");
        assert_eq!(controller.in_flight(), 0);
        assert!(controller.is_saving());

        sleep(Duration::from_millis(499)).await;
        assert!(controller.is_saving());

        sleep(Duration::from_millis(2)).await;
        settle().await;
        assert!(!controller.is_saving());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ok_keeps_local_edits() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::new());
        // The server merged in a concurrent change without conflict
        transport.push_save_response(SaveResult::Ok, "zAB");
        let controller = controller_for(&page, &transport, AutosaveConfig::default());

        page.new_content.type_text("AB");
        assert_eq!(
            controller.save().await,
            SaveOutcome::Applied(SaveResult::Ok)
        );

        assert_eq!(page.old_content.value(), "zAB");
        assert_eq!(page.new_content.value(), "AB");
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_scenario_server_wins() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_save_response(SaveResult::Conflicted, "AC");
        let controller = bootstrapped(&page, &transport);

        page.new_content.type_text("AB");
        sleep(Duration::from_millis(2001)).await;
        settle().await;

        assert_eq!(transport.requests(), vec![SaveRequest::new("AB", "A")]);
        assert_eq!(page.old_content.value(), "AC");
        assert_eq!(page.new_content.value(), "AC");

        sleep(Duration::from_millis(501)).await;
        settle().await;
        assert!(!controller.is_saving());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_response_leaves_buffers_and_clears_marker() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(TransportResponse::new(200, "<html>oops</html>"));
        let controller = controller_for(&page, &transport, AutosaveConfig::default());

        page.new_content.type_text("AB");
        assert_eq!(controller.save().await, SaveOutcome::Invalid);

        assert_eq!(page.old_content.value(), "A");
        assert_eq!(page.new_content.value(), "AB");
        assert!(!controller.is_saving());
        assert_eq!(page.preview.reload_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_status_keeps_marker() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(TransportResponse::new(500, "boom"));
        let controller = controller_for(&page, &transport, AutosaveConfig::default());

        page.new_content.type_text("AB");
        assert_eq!(
            controller.save().await,
            SaveOutcome::Rejected { status: 500 }
        );

        sleep(Duration::from_millis(5000)).await;
        assert!(controller.is_saving());
        assert_eq!(page.old_content.value(), "A");
        assert_eq!(page.new_content.value(), "AB");
        assert_eq!(page.preview.reload_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_is_not_retried() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_failure("connection refused");
        let controller = controller_for(&page, &transport, AutosaveConfig::default());

        page.new_content.type_text("AB");
        assert_eq!(controller.save().await, SaveOutcome::Failed);

        sleep(Duration::from_millis(10_000)).await;
        assert_eq!(transport.request_count(), 1);
        assert!(controller.is_saving());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::gated());
        let config = AutosaveConfig {
            request_timeout_ms: Some(1000),
            ..Default::default()
        };
        let controller = controller_for(&page, &transport, config);

        page.new_content.type_text("AB");
        assert_eq!(controller.save().await, SaveOutcome::Failed);
        assert_eq!(controller.in_flight(), 0);
        assert_eq!(page.old_content.value(), "A");
    }

    #[tokio::test(start_paused = true)]
    async fn test_serialized_saves_replay_after_in_flight_request() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::gated());
        transport.push_save_response(SaveResult::Ok, "AB");
        transport.push_save_response(SaveResult::Ok, "ABC");
        let controller = bootstrapped(&page, &transport);

        page.new_content.type_text("AB");
        sleep(Duration::from_millis(2001)).await;
        settle().await;
        assert_eq!(transport.request_count(), 1);

        // Edit while the first request is still on the wire
        page.new_content.type_text("ABC");
        sleep(Duration::from_millis(2001)).await;
        settle().await;
        assert_eq!(transport.request_count(), 1);
        assert_eq!(controller.in_flight(), 1);

        transport.release(1);
        settle().await;
        assert_eq!(
            transport.requests(),
            vec![SaveRequest::new("AB", "A"), SaveRequest::new("ABC", "AB")]
        );

        transport.release(1);
        settle().await;
        assert_eq!(page.old_content.value(), "ABC");
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_save_is_dropped_when_buffers_caught_up() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::gated());
        let controller = controller_for(&page, &transport, AutosaveConfig::default());

        page.new_content.type_text("AB");
        let first = tokio::spawn({
            let controller = controller.clone();
            async move { controller.save().await }
        });
        settle().await;

        assert_eq!(controller.save().await, SaveOutcome::Deferred);

        transport.release(1);
        assert_eq!(first.await.unwrap(), SaveOutcome::Applied(SaveResult::Ok));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_saves_when_not_serialized() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::gated());
        let config = AutosaveConfig {
            serialize_saves: false,
            ..Default::default()
        };
        let controller = controller_for(&page, &transport, config);

        page.new_content.type_text("AB");
        let first = tokio::spawn({
            let controller = controller.clone();
            async move { controller.save().await }
        });
        settle().await;

        page.new_content.type_text("ABC");
        let second = tokio::spawn({
            let controller = controller.clone();
            async move { controller.save().await }
        });
        settle().await;

        assert_eq!(controller.in_flight(), 2);
        assert_eq!(
            transport.requests(),
            vec![SaveRequest::new("AB", "A"), SaveRequest::new("ABC", "A")]
        );

        transport.release(2);
        assert!(matches!(first.await.unwrap(), SaveOutcome::Applied(_)));
        assert!(matches!(second.await.unwrap(), SaveOutcome::Applied(_)));
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_reset_waits_for_newer_request() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::gated());
        let controller = controller_for(&page, &transport, AutosaveConfig::default());

        page.new_content.type_text("AB");
        transport.release(1);
        controller.save().await;

        // A second request goes out before the first marker reset fires
        page.new_content.type_text("ABC");
        let second = tokio::spawn({
            let controller = controller.clone();
            async move { controller.save().await }
        });
        sleep(Duration::from_millis(600)).await;
        assert!(controller.is_saving());

        transport.release(1);
        second.await.unwrap();
        sleep(Duration::from_millis(501)).await;
        settle().await;
        assert!(!controller.is_saving());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_response_reloads_preview_and_relinks() {
        let page = MemoryEditPage::new("A").with_preview_links(["/index"]);
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(TransportResponse::new(503, ""));
        let controller = bootstrapped(&page, &transport);

        // Initial pass covers the first load
        assert!(!page.preview.current_anchors()[0].click());

        page.preview.set_links(["/index", "/notes"]);
        page.new_content.type_text("AB");
        controller.save().await;
        controller.save().await;

        assert_eq!(page.preview.reload_count(), 2);
        let anchors = page.preview.current_anchors();
        assert_eq!(anchors.len(), 2);
        for anchor in anchors {
            assert!(!anchor.click());
            assert_eq!(anchor.listener_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_manual_save_submits_form_without_transport() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::new());
        let controller = controller_for(&page, &transport, AutosaveConfig::default());

        // Equal buffers still submit
        controller.manual_save().await.unwrap();
        page.new_content.type_text("AB");
        controller.manual_save().await.unwrap();

        assert_eq!(transport.request_count(), 0);
        assert_eq!(
            page.submitter.submissions(),
            vec![
                FormSubmission {
                    new_content: "A".to_string(),
                    old_content: "A".to_string(),
                },
                FormSubmission {
                    new_content: "AB".to_string(),
                    old_content: "A".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_manual_save_reports_conflicted_submission() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::new());
        let controller = controller_for(&page, &transport, AutosaveConfig::default());

        page.submitter.respond_with(SubmitOutcome::Conflicted {
            location: "/notes.__edit__".to_string(),
        });
        page.new_content.type_text("AB");

        let outcome = controller.manual_save().await.unwrap();
        assert!(outcome.is_conflicted());
        assert_eq!(page.new_content.value(), "AB");
        assert_eq!(page.old_content.value(), "A");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_save_waits_for_in_flight_request() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::gated());
        let controller = bootstrapped(&page, &transport);

        page.new_content.type_text("AB");
        sleep(Duration::from_millis(2001)).await;
        settle().await;
        assert_eq!(controller.in_flight(), 1);

        // Edited again while the first save is still held
        page.new_content.type_text("ABC");
        let shutdown = tokio::spawn({
            let controller = controller.clone();
            async move { controller.shutdown_save().await }
        });
        settle().await;
        assert!(!shutdown.is_finished());
        assert!(!controller.has_pending_save());

        transport.release(2);
        assert_eq!(
            shutdown.await.unwrap(),
            SaveOutcome::Applied(SaveResult::Ok)
        );
        assert_eq!(
            transport.requests(),
            vec![SaveRequest::new("AB", "A"), SaveRequest::new("ABC", "AB")]
        );
        assert_eq!(page.old_content.value(), "ABC");
    }

    #[tokio::test]
    async fn test_flush_returns_at_once_when_idle() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::new());
        let controller = controller_for(&page, &transport, AutosaveConfig::default());

        controller.flush().await;
        assert_eq!(controller.shutdown_save().await, SaveOutcome::Unchanged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_button_click_submits_and_disarms_timer() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::new());
        let controller = bootstrapped(&page, &transport);

        page.new_content.type_text("AB");
        assert!(controller.has_pending_save());

        page.save_button.click();
        settle().await;
        assert_eq!(page.submitter.submissions().len(), 1);
        assert!(!controller.has_pending_save());

        sleep(Duration::from_millis(5000)).await;
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_without_form_is_inert() {
        let page = MemoryEditPage::new("A").without_form();
        let transport = Arc::new(ScriptedTransport::new());

        let controller =
            AutosaveController::bootstrap(&page, transport, &Config::new(), None).unwrap();
        assert!(controller.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_uses_configured_selectors() {
        let selectors = watom_core::PageSelectors {
            form_name: "wiki_form".to_string(),
            new_content_field: "body".to_string(),
            old_content_field: "baseline".to_string(),
            save_button_id: "submit".to_string(),
            preview_selector: "#preview".to_string(),
        };
        let page = MemoryEditPage::new("A").with_selectors(selectors.clone());
        let transport = Arc::new(ScriptedTransport::new());

        let defaults =
            AutosaveController::bootstrap(&page, transport.clone(), &Config::new(), None);
        assert!(defaults.unwrap().is_none());

        let config = Config {
            selectors,
            ..Config::new()
        };
        let _controller = AutosaveController::bootstrap(&page, transport.clone(), &config, None)
            .unwrap()
            .unwrap();

        page.new_content.type_text("AB");
        sleep(Duration::from_millis(2001)).await;
        settle().await;
        assert_eq!(transport.requests(), vec![SaveRequest::new("AB", "A")]);
    }

    #[tokio::test]
    async fn test_bootstrap_requires_button_and_preview() {
        let transport = Arc::new(ScriptedTransport::new());

        let page = MemoryEditPage::new("A").without_save_button();
        let err = AutosaveController::bootstrap(&page, transport.clone(), &Config::new(), None)
            .unwrap_err();
        assert!(matches!(err, WatomError::Dom(_)));
        assert!(err.to_string().contains("btn_save"));

        let page = MemoryEditPage::new("A").without_preview();
        let err =
            AutosaveController::bootstrap(&page, transport, &Config::new(), None).unwrap_err();
        assert!(err.to_string().contains(".j-preview-frame"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_controller_stops_listening() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::new());
        drop(bootstrapped(&page, &transport));

        page.new_content.type_text("AB");
        sleep(Duration::from_millis(5000)).await;
        assert_eq!(transport.request_count(), 0);
    }

    struct Recorder {
        events: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl AutosaveEventHandler for Recorder {
        async fn handle_event(&self, event: &AutosaveEvent) -> Result<()> {
            self.events.lock().push(event.event_type());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_conflict_is_published() {
        let page = MemoryEditPage::new("A");
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_save_response(SaveResult::Conflicted, "AC");

        let bus = Arc::new(InMemoryEventBus::new());
        let recorder = Arc::new(Recorder {
            events: Mutex::new(Vec::new()),
        });
        bus.subscribe(recorder.clone()).await.unwrap();

        let controller = AutosaveController::new(
            page.collaborators(),
            transport,
            AutosaveConfig::default(),
            Some(bus),
        );

        page.new_content.type_text("AB");
        controller.save().await;

        assert_eq!(
            *recorder.events.lock(),
            vec![
                "saving_indicator",
                "save_sent",
                "preview_reloaded",
                "conflict"
            ]
        );
    }
}
