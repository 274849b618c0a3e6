use anyhow::Result;
use clinical_flow::request::SymptomCheck;
use clinical_flow::{ClinicalPipeline, ClinicalRequest, PromptBuilder};
use std::env;
use swasthya_service::ServiceConfig;

/// Sends one symptom check through the configured providers and prints the
/// structured result.
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("Provider probe: symptom check");
    println!("=============================");

    let config = ServiceConfig::from_env();
    if config.openrouter_api_key.is_none() {
        println!("OPENROUTER_API_KEY not set, skipping probe");
        return Ok(());
    }

    let symptoms = env::args()
        .nth(1)
        .unwrap_or_else(|| "fever for three days with dry cough and body ache".to_string());
    let language = env::args().nth(2).unwrap_or_else(|| "english".to_string());
    println!("Symptoms: {symptoms}");
    println!("Language: {language}");

    let pipeline = ClinicalPipeline::new(
        PromptBuilder::new(config.models.clone()),
        config.provider_set()?,
    );
    let request = ClinicalRequest::SymptomCheck(SymptomCheck::new(symptoms, language));

    match pipeline.run(&request).await {
        Ok(outcome) => {
            println!("Model:    {}", outcome.model);
            println!("Latency:  {} ms", outcome.latency.as_millis());
            match &outcome.fallback {
                Some(reason) => println!("Fallback: {reason}"),
                None => println!("Fallback: no"),
            }
            println!();
            println!("{}", serde_json::to_string_pretty(&outcome.result.to_value())?);
        }
        Err(e) => {
            eprintln!("Probe failed: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}
