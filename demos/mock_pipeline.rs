//! Two-step translate-then-summarize pipeline against a scripted mock provider.
//!
//! Run with `RUST_LOG=prompt_pipeline=debug cargo run --example mock_pipeline`.

use prompt_pipeline::backend::{MockBackend, MockReply};
use prompt_pipeline::pipelines::{NewPipeline, StepDefinition};
use prompt_pipeline::store::MemoryStore;
use prompt_pipeline::templates::NewTemplate;
use prompt_pipeline::{Engine, Event, FnEventHandler, ProviderRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mock = MockBackend::scripted(vec![
        MockReply::text("Hello world, how are you today?"),
        MockReply::text("A friendly greeting."),
    ]);
    let engine = Engine::builder(Arc::new(MemoryStore::new()))
        .registry(ProviderRegistry::new().register(Arc::new(mock)))
        .event_handler(Arc::new(FnEventHandler(|event: Event| match event {
            Event::StepStarted { step_order, model, .. } => {
                println!("[step {}] calling {}", step_order, model)
            }
            Event::RunFinished { status, .. } => println!("[done] {:?}", status),
            _ => {}
        })))
        .build()?;

    let me = uuid::Uuid::new_v4();
    let translate = engine
        .templates
        .create(
            me,
            NewTemplate {
                name: "translate".into(),
                description: Some("Translate arbitrary text to English".into()),
                content: "Translate to English: {{text}}".into(),
            },
        )
        .await?;
    let summarize = engine
        .templates
        .create(
            me,
            NewTemplate {
                name: "summarize".into(),
                description: None,
                content: "Summarize in one sentence: {{english_text}}".into(),
            },
        )
        .await?;

    let step = |template_id, output_variable: &str| StepDefinition {
        template_id,
        provider: "mock".into(),
        model: "mock-model".into(),
        output_variable: output_variable.into(),
    };
    let pipeline = engine
        .pipelines
        .create(
            me,
            NewPipeline {
                name: "translate-and-summarize".into(),
                description: None,
                steps: vec![step(translate.id, "english_text"), step(summarize.id, "summary")],
            },
        )
        .await?;

    let vars = HashMap::from([(
        "text".to_string(),
        "Bonjour le monde, comment allez-vous aujourd'hui ?".to_string(),
    )]);
    let run = engine.executor.execute(pipeline.id, vars, me).await?;

    for step in &run.step_executions {
        println!(
            "step {} {:?}\n  prompt: {}\n  output: {}",
            step.step_order,
            step.status,
            step.input_prompt.as_deref().unwrap_or("-"),
            step.output.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}
