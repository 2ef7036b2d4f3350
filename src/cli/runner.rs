//! CLI runner - executes commands

use crate::auth::{AuthMethodBuilder, SECRET_PREFIX};
use crate::cli::commands::{Cli, Commands};
use crate::config::{ApiConfig, WriterConfiguration};
use crate::convert::{parse_csv, write_csv, JsonConverter};
use crate::error::{Error, Result, ResultExt};
use crate::http::{form_pairs, join_url, HttpClient, HttpClientConfig, RequestConfig};
use crate::resolver::{self, functions, string_form};
use crate::signature::SignMethodBuilder;
use crate::types::{JsonObject, RequestContentType};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Iterations between progress messages
const PROGRESS_INTERVAL: usize = 50;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

/// Outcome of a writer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Requests answered with a success status
    pub sent: usize,
    /// Requests that failed while `continue_on_failure` was set
    pub failed: usize,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Run { data_dir } => self.write(data_dir).await.map(|_| ()),
            Commands::Validate { data_dir } => self.validate(data_dir),
            Commands::List => self.list(),
        }
    }

    /// Send the input table to the configured API
    pub async fn write(&self, data_dir: &Path) -> Result<RunSummary> {
        let started = Instant::now();
        let config = WriterConfiguration::from_data_dir(data_dir)?;
        let user_params = resolver::resolve_user_parameters(&config.user_parameters)?;

        let authenticator =
            AuthMethodBuilder::from_spec(config.api.authentication.as_ref(), &user_params)?
                .with_signature(SignMethodBuilder::from_spec(
                    config.api.signature.as_ref(),
                    &user_params,
                )?);
        let mut client = HttpClient::with_auth(http_config(&config.api)?, authenticator)?;
        client.add_secrets(user_secrets(&user_params));
        client.login().await?;

        let table = find_input_table(data_dir)?;
        let iterations = plan_iterations(&table, &config.request_content.iterate_by_columns)?;
        info!(
            "Writing {} with {} iteration(s) as {}",
            table.display(),
            iterations.len(),
            config.request_content.content_type
        );

        let mut summary = RunSummary::default();
        for (index, iteration) in iterations.iter().enumerate() {
            if index > 0 && index % PROGRESS_INTERVAL == 0 {
                info!("Processing iteration {index}/{}", iterations.len());
            }
            let mut requests = IterationRequests::prepare(&config, &user_params, iteration)?;
            client.add_secrets(requests.secrets.drain(..));

            for request in requests.payload.requests(&requests.base) {
                match client
                    .send(config.request_parameters.method, &requests.url, &request?)
                    .await
                {
                    Ok(response) => {
                        debug!(
                            "Request to {} returned {}",
                            client.redactor().redact(&requests.url),
                            response.status
                        );
                        summary.sent += 1;
                    }
                    Err(e) if config.request_parameters.continue_on_failure => {
                        warn!("Request failed, continuing: {e}");
                        summary.failed += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        info!(
            "Writer finished: {} request(s) sent, {} failed in {:.1}s",
            summary.sent,
            summary.failed,
            started.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    /// Validate the configuration and authentication parameters
    fn validate(&self, data_dir: &Path) -> Result<()> {
        let config = WriterConfiguration::from_data_dir(data_dir)?;
        let user_params = resolver::resolve_user_parameters(&config.user_parameters)?;
        let authenticator =
            AuthMethodBuilder::from_spec(config.api.authentication.as_ref(), &user_params)?;
        let signature = SignMethodBuilder::from_spec(config.api.signature.as_ref(), &user_params)?;

        self.output_message(&json!({
            "status": "VALID",
            "authentication": authenticator.method().name(),
            "signature": signature.name(),
            "content_type": config.request_content.content_type.to_string(),
        }));
        Ok(())
    }

    /// List registered authentication methods, signatures and functions
    fn list(&self) -> Result<()> {
        self.output_message(&json!({
            "authentication": AuthMethodBuilder::supported_methods(),
            "signature": SignMethodBuilder::supported_methods(),
            "functions": functions::supported_functions(),
        }));
        Ok(())
    }

    fn output_message(&self, msg: &Value) {
        let text = if self.cli.verbose {
            serde_json::to_string_pretty(msg)
        } else {
            serde_json::to_string(msg)
        };
        if let Ok(text) = text {
            println!("{text}");
        }
    }
}

/// Transport settings from the API configuration
fn http_config(api: &ApiConfig) -> Result<HttpClientConfig> {
    Ok(HttpClientConfig::builder()
        .timeout(api.timeout())
        .max_retries(api.retry_config.max_retries)
        .backoff_factor(api.retry_config.backoff_factor)?
        .retry_codes(api.retry_config.codes.clone())
        .ssl_verification(api.ssl_verification)
        .build())
}

/// String forms of the `#` user parameters, masked in every log line
fn user_secrets(user_params: &JsonObject) -> Vec<String> {
    user_params
        .iter()
        .filter(|(key, _)| key.starts_with(SECRET_PREFIX))
        .map(|(_, value)| string_form(value))
        .filter(|value| !value.is_empty())
        .collect()
}

// ============================================================================
// Input table and iterations
// ============================================================================

/// The CSV table under `in/tables`; the first one in name order when there are several
fn find_input_table(data_dir: &Path) -> Result<PathBuf> {
    let tables_dir = data_dir.join("in").join("tables");
    let mut tables: Vec<PathBuf> = fs::read_dir(&tables_dir)
        .with_context(|| format!("Cannot list {}", tables_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    tables.sort();

    match tables.len() {
        0 => Err(Error::config("No input table found, map one table to the writer input")),
        1 => Ok(tables.remove(0)),
        n => {
            warn!("{n} input tables found, only the first one is written");
            Ok(tables.remove(0))
        }
    }
}

/// Data sent by one iteration
#[derive(Debug)]
enum IterationData {
    /// The whole input table
    File(PathBuf),
    /// Header and a single row, iteration columns removed
    Records(Vec<Vec<String>>),
}

#[derive(Debug)]
struct Iteration {
    /// Iteration column values, merged into the user parameters
    params: JsonObject,
    data: IterationData,
}

fn plan_iterations(table: &Path, iterate_by: &[String]) -> Result<Vec<Iteration>> {
    if iterate_by.is_empty() {
        return Ok(vec![Iteration {
            params: JsonObject::new(),
            data: IterationData::File(table.to_path_buf()),
        }]);
    }

    let text = fs::read_to_string(table)
        .with_context(|| format!("Cannot read {}", table.display()))?;
    let records = parse_csv(&text, ',')?;
    let Some((header, rows)) = records.split_first() else {
        warn!("The file is empty!");
        return Ok(Vec::new());
    };

    let mut iteration_indices = Vec::with_capacity(iterate_by.len());
    for column in iterate_by {
        let index = header.iter().position(|h| h == column).ok_or_else(|| {
            Error::config(format!(
                "The iteration column '{column}' is missing from the input table"
            ))
        })?;
        iteration_indices.push(index);
    }

    let keep = |fields: &[String]| -> Vec<String> {
        fields
            .iter()
            .enumerate()
            .filter(|(i, _)| !iteration_indices.contains(i))
            .map(|(_, f)| f.clone())
            .collect()
    };
    let data_header = keep(header);

    Ok(rows
        .iter()
        .map(|row| {
            let params = iterate_by
                .iter()
                .zip(&iteration_indices)
                .map(|(column, &i)| {
                    let value = row.get(i).cloned().unwrap_or_default();
                    (column.clone(), Value::String(value))
                })
                .collect();
            Iteration {
                params,
                data: IterationData::Records(vec![data_header.clone(), keep(row)]),
            }
        })
        .collect())
}

// ============================================================================
// Request building
// ============================================================================

/// Replace `[[name]]` and `{{name}}` with iteration values
fn substitute_iteration(template: &str, params: &JsonObject) -> String {
    params.iter().fold(template.to_string(), |acc, (name, value)| {
        let value = string_form(value);
        acc.replace(&format!("[[{name}]]"), &value)
            .replace(&format!("{{{{{name}}}}}"), &value)
    })
}

fn merged(defaults: &JsonObject, overrides: &JsonObject) -> JsonObject {
    let mut out = defaults.clone();
    out.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    out
}

/// Body source of one iteration
#[derive(Debug)]
enum Payload {
    /// Rows converted to JSON chunk by chunk while sending
    Json {
        converter: JsonConverter,
        records: Vec<Vec<String>>,
        form: bool,
    },
    Binary(Vec<u8>),
    Empty,
}

/// Everything needed to send one iteration; request bodies are built lazily
#[derive(Debug)]
struct IterationRequests {
    url: String,
    /// Resolved headers and query shared by every request of the iteration
    base: RequestConfig,
    payload: Payload,
    /// Secret values only known once iteration values were merged in
    secrets: Vec<String>,
}

impl IterationRequests {
    fn prepare(
        config: &WriterConfiguration,
        user_params: &JsonObject,
        iteration: &Iteration,
    ) -> Result<Self> {
        let params = if iteration.params.is_empty() {
            user_params.clone()
        } else {
            resolver::resolve_user_parameters(&merged(user_params, &iteration.params))?
        };

        let api = &config.api;
        let request = &config.request_parameters;
        let headers = resolver::resolve_object(
            &merged(&api.default_headers, &request.headers),
            &params,
            true,
        )?;
        let query = resolver::resolve_object(
            &merged(&api.default_query_parameters, &request.query_parameters),
            &params,
            true,
        )?;

        let url = join_url(
            &substitute_iteration(&api.base_url, &iteration.params),
            &substitute_iteration(&request.endpoint_path, &iteration.params),
        );

        let mut base = RequestConfig::new();
        for (key, value) in &headers {
            base = base.header(key, string_form(value));
        }
        for (key, value) in &query {
            base = base.query(key, string_form(value));
        }

        let content = &config.request_content;
        let payload = match content.content_type {
            RequestContentType::Json | RequestContentType::JsonUrlEncoded => {
                let mapping = content.json_mapping.as_ref().ok_or_else(|| {
                    Error::validation(format!(
                        "The 'json_mapping' configuration is required in mode {}",
                        content.content_type
                    ))
                })?;
                let form = content.content_type == RequestContentType::JsonUrlEncoded;
                let mut converter = JsonConverter::from_mapping(mapping);
                if form {
                    converter = converter.single_row();
                }
                let records = match &iteration.data {
                    IterationData::File(path) => parse_csv(
                        &fs::read_to_string(path)
                            .with_context(|| format!("Cannot read {}", path.display()))?,
                        ',',
                    )?,
                    IterationData::Records(records) => records.clone(),
                };
                Payload::Json {
                    converter,
                    records,
                    form,
                }
            }
            RequestContentType::Binary | RequestContentType::BinaryGz => {
                let bytes = match &iteration.data {
                    IterationData::File(path) => fs::read(path)
                        .with_context(|| format!("Cannot read {}", path.display()))?,
                    IterationData::Records(records) => write_csv(records, ',').into_bytes(),
                };
                if content.content_type == RequestContentType::BinaryGz {
                    Payload::Binary(gzip(&bytes)?)
                } else {
                    Payload::Binary(bytes)
                }
            }
            RequestContentType::EmptyRequest => Payload::Empty,
        };

        let secrets = if iteration.params.is_empty() {
            Vec::new()
        } else {
            user_secrets(&params)
        };

        Ok(Self {
            url,
            base,
            payload,
            secrets,
        })
    }
}

impl Payload {
    /// Request configurations, one per payload, built as they are consumed
    fn requests<'a>(
        &'a mut self,
        base: &'a RequestConfig,
    ) -> Box<dyn Iterator<Item = Result<RequestConfig>> + Send + 'a> {
        match self {
            Payload::Json {
                converter,
                records,
                form,
            } => {
                let form = *form;
                Box::new(converter.payloads(records).map(move |payload| -> Result<RequestConfig> {
                    match payload? {
                        Value::Object(map) if form => Ok(base.clone().form(form_pairs(&map))),
                        _ if form => Err(Error::config("JSON_URL_ENCODED payloads must be objects")),
                        payload => Ok(base.clone().json(payload)),
                    }
                }))
            }
            Payload::Binary(bytes) => {
                Box::new(std::iter::once(Ok(base.clone().binary(std::mem::take(bytes)))))
            }
            Payload::Empty => Box::new(std::iter::once(Ok(base.clone()))),
        }
    }
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}
