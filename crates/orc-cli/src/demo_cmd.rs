//! `orc demo`: drive a single conversational turn in-process, with no
//! database, so the turn loop can be exercised end to end from the
//! command line.

use std::sync::Arc;

use anyhow::Result;
use orc_core::checkpoint::{Checkpointer, InMemoryCheckpointer};
use orc_core::driver::TurnOutcome;
use orc_core::gateway::{Gateway, GatewayOutcome};
use orc_core::llm::EchoLlmService;

use crate::pipeline::build_driver;

/// Run one turn of the conversation pipeline against the given message and
/// print the resulting assistant messages (or the pending approval, if the
/// turn suspended).
pub async fn run_demo(message: &str, thread_id: &str) -> Result<()> {
    let checkpointer: Arc<dyn Checkpointer> = Arc::new(InMemoryCheckpointer::new());
    let llm = Arc::new(EchoLlmService);
    let gateway = Gateway::new(checkpointer.clone(), llm.clone());
    let driver = build_driver(llm);

    let result = gateway.process_message(thread_id, message).await;
    if !result.slash_commands_processed.is_empty() {
        println!("applied: {}", result.slash_commands_processed.join(" "));
    }

    let state = match result.outcome {
        GatewayOutcome::AgentState(state) => state,
        GatewayOutcome::Resume(resume) => {
            let state = gateway.state_for_resume(thread_id).await;
            let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
            let outcome = driver
                .resume_turn(state, resume, orc_core::capability::StatusSink::new(tx))
                .await?;
            return report_turn_outcome(&gateway, thread_id, outcome).await;
        }
        GatewayOutcome::ControlOnly(state) => {
            gateway.save(thread_id, &state, None).await;
            return Ok(());
        }
    };
    let outcome = driver.run_turn(state).await?;
    report_turn_outcome(&gateway, thread_id, outcome).await
}

async fn report_turn_outcome(gateway: &Gateway, thread_id: &str, outcome: TurnOutcome) -> Result<()> {
    match &outcome {
        TurnOutcome::Finished(state) => {
            gateway.save(thread_id, state, None).await;
            for m in &state.messages {
                println!("{:?}: {}", m.role, m.content);
            }
        }
        TurnOutcome::Suspended { state, interrupt } => {
            gateway.save(thread_id, state, Some(interrupt.clone())).await;
            println!("suspended, awaiting approval: {}", interrupt.payload);
        }
    }

    Ok(())
}
