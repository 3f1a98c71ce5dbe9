//! End-to-end turns through the engine.

#[cfg(test)]
mod tests {
    use crate::config::{CorruptRowPolicy, EngineConfig};
    use crate::conversation::{ConversationId, StepOutcome};
    use crate::engine::{ConversationEngine, ConversationFactory, Disposition, TurnOutcome, TurnReport};
    use crate::errors::ConvoflowError;
    use crate::pipeline::{
        ActiveStepHandler, CommandRouteHandler, CommandRoutes, DispatchOutcome, HandlerChain,
        Handler, KeyboardResponse, Message, MockBotClient, ServiceScope,
    };
    use crate::store::{ConversationStore, InMemoryRecordStore, RecordStore};
    use crate::testing::{
        checkout_dispatcher, fixture_registry, Address, CancelButtonHandler, CheckoutContext,
        PingHandler, RecordingBot,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    struct Harness {
        engine: ConversationEngine,
        records: Arc<InMemoryRecordStore>,
        bot: Arc<RecordingBot>,
    }

    fn chain() -> HandlerChain {
        HandlerChain::builder()
            .register::<PingHandler>()
            .register::<ActiveStepHandler>()
            .register::<CommandRouteHandler>()
            .register::<CancelButtonHandler>()
            .build()
            .unwrap()
    }

    fn harness(config: &EngineConfig) -> Harness {
        let records = Arc::new(InMemoryRecordStore::new());
        let bot = Arc::new(RecordingBot::new());
        let store = ConversationStore::with_config(records.clone(), fixture_registry().unwrap(), config);
        let engine = ConversationEngine::new(store, chain(), checkout_dispatcher(), bot.clone())
            .with_config(config)
            .with_services(ServiceScope::new().with(CommandRoutes::new().route("checkout", "Checkout")))
            .with_factory(ConversationFactory::new(|id| Box::new(CheckoutContext::new(id))));
        Harness { engine, records, bot }
    }

    async fn say(h: &Harness, id: ConversationId, text: &str) -> TurnReport {
        match h.engine.handle_message(id, Message::new("m", text)).await.unwrap() {
            TurnOutcome::Completed(report) => report,
            TurnOutcome::Contended(err) => panic!("unexpected contention: {err}"),
        }
    }

    async fn load(h: &Harness, id: ConversationId) -> CheckoutContext {
        let state = h.engine.store().fetch(id, None).await.unwrap().into_found().unwrap();
        state.downcast_ref::<CheckoutContext>().unwrap().clone()
    }

    #[tokio::test]
    async fn test_full_checkout_flow() {
        let h = harness(&EngineConfig::default());
        let id = ConversationId::new();

        let report = say(&h, id, "/checkout").await;
        assert!(report.created);
        assert_eq!(report.dispatch, DispatchOutcome::Handled);
        assert_eq!(report.disposition, Disposition::Saved);
        assert_eq!(report.step_outcome, Some(StepOutcome::Advance));
        assert_eq!(
            report.processed,
            vec![PingHandler::name(), ActiveStepHandler::name(), CommandRouteHandler::name()]
        );

        say(&h, id, "scones").await;
        let report = say(&h, id, "done").await;
        assert!(!report.created);
        assert_eq!(report.processed, vec![PingHandler::name(), ActiveStepHandler::name()]);

        say(&h, id, "Lisbon").await;
        let state = load(&h, id).await;
        assert_eq!(state.base.step(), 3);
        assert_eq!(state.cart, vec!["/checkout".to_string(), "scones".to_string()]);
        assert_eq!(
            state.base.data().get::<Address>("ship_to").unwrap(),
            Some(Address::new("Lisbon", "0000"))
        );

        let report = say(&h, id, "confirm").await;
        assert_eq!(report.disposition, Disposition::Deleted);
        assert!(h.records.is_empty());
        assert!(h.engine.store().fetch(id, None).await.unwrap().is_not_found());
    }

    #[tokio::test]
    async fn test_row_cursor_is_queryable() {
        let h = harness(&EngineConfig::default());
        let id = ConversationId::new();
        say(&h, id, "/checkout").await;

        let rows = h.records.rows_for_action("Checkout");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].step, 1);
        assert_eq!(rows[0].type_tag, "CheckoutContext");
    }

    #[tokio::test]
    async fn test_transfer_moves_to_other_action() {
        let h = harness(&EngineConfig::default());
        let id = ConversationId::new();
        for text in ["/checkout", "done", "Porto"] {
            say(&h, id, text).await;
        }

        let report = say(&h, id, "help").await;
        assert_eq!(report.step_outcome, Some(StepOutcome::transfer("Support")));

        let state = load(&h, id).await;
        assert_eq!(state.base.active_action(), Some("Support"));
        assert_eq!(state.base.step(), 0);

        say(&h, id, "anything").await;
        assert_eq!(load(&h, id).await.base.data().get::<bool>("ticket").unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_unclaimed_chatter_creates_nothing() {
        let h = harness(&EngineConfig::default());
        let id = ConversationId::new();

        let report = say(&h, id, "hello?").await;

        assert_eq!(report.dispatch, DispatchOutcome::Unhandled);
        assert_eq!(report.disposition, Disposition::Discarded);
        assert!(h.records.is_empty());
    }

    #[tokio::test]
    async fn test_handled_without_step_still_saves_new_conversation() {
        let h = harness(&EngineConfig::default());
        let id = ConversationId::new();

        let report = say(&h, id, "ping").await;

        assert_eq!(report.disposition, Disposition::Saved);
        assert_eq!(report.step_outcome, None);
        assert_eq!(h.bot.texts(), vec!["pong".to_string()]);
        assert_eq!(h.records.len(), 1);
    }

    #[tokio::test]
    async fn test_step_failure_persists_nothing() {
        let h = harness(&EngineConfig::default());
        let id = ConversationId::new();
        for text in ["/checkout", "done", "Faro"] {
            say(&h, id, text).await;
        }
        let before = h.records.rows();

        let err = h
            .engine
            .handle_message(id, Message::new("m", "fail"))
            .await
            .unwrap_err();

        match err {
            ConvoflowError::StepExecution(e) => {
                assert_eq!(e.action, "Checkout");
                assert_eq!(e.step, 3);
                assert_eq!(e.source.to_string(), "payment gateway unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.records.rows(), before);
        assert!(!h.engine.store().locks().is_locked(id));
    }

    #[tokio::test]
    async fn test_cancel_button_deletes_conversation() {
        let h = harness(&EngineConfig::default());
        let id = ConversationId::new();
        say(&h, id, "ping").await;
        assert_eq!(h.records.len(), 1);

        let outcome = h
            .engine
            .handle_keyboard(id, KeyboardResponse::new("k", "cancel"))
            .await
            .unwrap();

        let report = outcome.report().unwrap();
        assert_eq!(report.disposition, Disposition::Deleted);
        assert!(h.records.is_empty());
    }

    #[tokio::test]
    async fn test_default_action_applies_to_new_conversations() {
        let config = EngineConfig::new().with_default_action("Support");
        let h = harness(&config);
        let id = ConversationId::new();

        let report = say(&h, id, "hi").await;

        assert!(report.created);
        assert_eq!(report.dispatch, DispatchOutcome::Handled);
        let state = load(&h, id).await;
        assert_eq!(state.base.active_action(), Some("Support"));
    }

    #[tokio::test]
    async fn test_corrupt_row_is_replaced_when_treated_as_missing() {
        let h = harness(&EngineConfig::new().with_corrupt_rows(CorruptRowPolicy::TreatAsMissing));
        let id = ConversationId::new();
        say(&h, id, "/checkout").await;

        let mut row = h.records.rows().remove(0);
        row.payload = "{not json".to_string();
        h.records.update(row.clone()).await.unwrap();

        let report = say(&h, id, "/checkout").await;
        assert!(report.created);
        assert_eq!(report.disposition, Disposition::Saved);

        let rows = h.records.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, row.id);
        assert_ne!(rows[0].payload, row.payload);
        assert_eq!(load(&h, id).await.base.active_action(), Some("Checkout"));
    }

    #[tokio::test]
    async fn test_unclaimed_event_leaves_corrupt_row_alone() {
        let h = harness(&EngineConfig::new().with_corrupt_rows(CorruptRowPolicy::TreatAsMissing));
        let id = ConversationId::new();
        say(&h, id, "ping").await;

        let mut row = h.records.rows().remove(0);
        row.type_tag = "RefundContext".to_string();
        h.records.update(row.clone()).await.unwrap();

        let report = say(&h, id, "hello?").await;
        assert_eq!(report.disposition, Disposition::Discarded);
        assert_eq!(h.records.rows(), vec![row]);
    }

    #[tokio::test]
    async fn test_turn_contention_is_an_outcome() {
        let config = EngineConfig::new().with_turn_timeout(Duration::from_millis(30));
        let h = harness(&config);
        let id = ConversationId::new();

        let _held = h.engine.store().lease(id, None).await.unwrap();
        let outcome = h.engine.handle_message(id, Message::new("m", "/checkout")).await.unwrap();

        match outcome {
            TurnOutcome::Contended(err) => assert_eq!(err.conversation_id, id),
            TurnOutcome::Completed(report) => panic!("unexpected completion: {report:?}"),
        }
        assert!(h.records.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_conversations_run_concurrently() {
        let h = Arc::new(harness(&EngineConfig::default()));
        let ids: Vec<_> = (0..16).map(|_| ConversationId::new()).collect();

        let tasks = ids.iter().map(|&id| {
            let h = Arc::clone(&h);
            tokio::spawn(async move { say(&h, id, "/checkout").await })
        });
        for report in futures::future::join_all(tasks).await {
            assert!(report.unwrap().created);
        }

        assert_eq!(h.records.len(), 16);
    }

    #[tokio::test]
    async fn test_bot_failure_is_handler_error() {
        let mut bot = MockBotClient::new();
        bot.expect_platform().return_const("mock");
        bot.expect_send_text()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("rate limited")));

        let records = Arc::new(InMemoryRecordStore::new());
        let store = ConversationStore::new(records.clone(), fixture_registry().unwrap());
        let engine = ConversationEngine::new(store, chain(), checkout_dispatcher(), Arc::new(bot));

        let err = engine
            .handle_message(ConversationId::new(), Message::new("m", "ping"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "handler");
        assert!(err.to_string().contains("rate limited"));
        assert!(records.is_empty());
    }
}
