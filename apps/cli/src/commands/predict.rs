//! Predict command implementation.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use colored::Colorize;
use serde_json::{Value, json};
use tensorlink_core::{
    Connection, PredictCall, PredictOutcome, PredictionClient, Tensor, TensorValues,
};

/// Predict parameters after merging flags with the config file.
#[derive(Debug, Default)]
pub struct PredictArgs {
    pub image: Option<String>,
    pub model: Option<String>,
    pub signature: Option<String>,
    pub input_name: Option<String>,
    pub version: Option<i64>,
    pub json: bool,
}

/// Execute the predict command.
pub async fn execute(connection: Arc<Connection>, args: PredictArgs) -> Result<()> {
    let model = args.model.context("No model given. Pass --model or set [predict].model")?;
    let signature =
        args.signature.context("No signature given. Pass --signature or set [predict].signature")?;

    let mut call = PredictCall::new(model.as_str(), signature)
        .deadline(connection.config().default_deadline());
    if let Some(name) = args.input_name {
        call = call.input_name(name);
    }
    if let Some(version) = args.version {
        call = call.version(version);
    }
    call = match args.image.as_deref() {
        Some("-") => call.stream(tokio::io::stdin()),
        Some(path) => call.path(path),
        None => call,
    };

    let client = PredictionClient::new(connection);
    let outputs = match client.predict(call).await? {
        PredictOutcome::Success(outputs) => outputs,
        PredictOutcome::NoInput => bail!("No image given. Pass --image <file> or --image - for stdin"),
        PredictOutcome::Failure(err) => {
            return Err(anyhow!(err).context(format!("Prediction with model '{model}' failed")));
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outputs_to_json(&outputs))?);
    } else {
        print_outputs(&outputs);
    }
    Ok(())
}

fn sorted(outputs: &HashMap<String, Tensor>) -> Vec<(&String, &Tensor)> {
    let mut entries: Vec<_> = outputs.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

fn print_outputs(outputs: &HashMap<String, Tensor>) {
    if outputs.is_empty() {
        println!("{}", "No outputs returned".yellow());
        return;
    }
    for (name, tensor) in sorted(outputs) {
        println!("{} {}", format!("{name}:").bold().cyan(), tensor);
    }
}

fn values_to_json(values: &TensorValues) -> Value {
    match values {
        TensorValues::Strings(v) => {
            json!(v.iter().map(|s| String::from_utf8_lossy(s).into_owned()).collect::<Vec<_>>())
        }
        TensorValues::F32(v) => json!(v),
        TensorValues::F64(v) => json!(v),
        TensorValues::I32(v) => json!(v),
        TensorValues::I64(v) => json!(v),
        TensorValues::Bool(v) => json!(v),
        TensorValues::Packed(b) => json!({ "packed_bytes": b.len() }),
        TensorValues::Empty => json!([]),
    }
}

/// Outputs as a JSON object keyed by output name.
pub fn outputs_to_json(outputs: &HashMap<String, Tensor>) -> Value {
    let map: serde_json::Map<String, Value> = sorted(outputs)
        .into_iter()
        .map(|(name, tensor)| {
            let entry = json!({
                "dtype": format!("{:?}", tensor.dtype),
                "shape": tensor.shape.0,
                "values": values_to_json(&tensor.values),
            });
            (name.clone(), entry)
        })
        .collect();
    Value::Object(map)
}
