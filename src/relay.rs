// Relay - owns the decode pipeline, pushes reports to the sink, answers management queries
//
// The line source (serial reader or simulator) and management callers share
// one Relay. Pipeline state sits behind a single mutex so lines are applied
// strictly in arrival order; parameters have their own per-field locks.

use crate::config::AppConfig;
use crate::dispatch::{DispatchCounts, Dispatched, Dispatcher, UnhandledHandler};
use crate::nmea::GpsDecoder;
use crate::params::{ParamError, ParamKey, ParameterStore, Parameters};
use crate::report::{self, FusedReport, ReportError};
use crate::sink::ReportSink;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

// Recent raw lines kept for the display page
const LINE_BUFFER_SIZE: usize = 100;

struct Pipeline {
    dispatcher: Dispatcher,
    line_buffer: VecDeque<String>,
    last_sent: Option<FusedReport>,
    last_line_time: Option<DateTime<Utc>>,
}

pub struct Relay {
    pipeline: Mutex<Pipeline>,
    params: ParameterStore,
    sink: Mutex<Box<dyn ReportSink>>,
}

impl Relay {
    pub fn new(config: &AppConfig, sink: impl ReportSink + 'static) -> Self {
        let dispatcher = Dispatcher::new(
            GpsDecoder::new(config.max_sentence_length),
            config.fix_policy,
        );
        Self::with_dispatcher(dispatcher, config.parameters.clone(), sink)
    }

    pub fn with_dispatcher(
        dispatcher: Dispatcher,
        parameters: Parameters,
        sink: impl ReportSink + 'static,
    ) -> Self {
        Self {
            pipeline: Mutex::new(Pipeline {
                dispatcher,
                line_buffer: VecDeque::with_capacity(LINE_BUFFER_SIZE),
                last_sent: None,
                last_line_time: None,
            }),
            params: ParameterStore::from_parameters(parameters),
            sink: Mutex::new(Box::new(sink)),
        }
    }

    /// Route unhandled lines somewhere other than the debug log
    pub fn set_unhandled_handler(&self, handler: impl UnhandledHandler + 'static) {
        let mut pipeline = self.lock_pipeline();
        let dispatcher = std::mem::take(&mut pipeline.dispatcher);
        pipeline.dispatcher = dispatcher.with_unhandled_handler(handler);
    }

    fn lock_pipeline(&self) -> MutexGuard<'_, Pipeline> {
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn process_line(&self, line: &str) -> Dispatched {
        self.process_line_at(line, Utc::now())
    }

    /// Dispatch one line. A new bearing triggers a report to the sink.
    pub fn process_line_at(&self, line: &str, now: DateTime<Utc>) -> Dispatched {
        let (outcome, report) = {
            let mut pipeline = self.lock_pipeline();

            let trimmed = line.trim_end_matches(['\r', '\n']);
            if !trimmed.is_empty() {
                if pipeline.line_buffer.len() >= LINE_BUFFER_SIZE {
                    pipeline.line_buffer.pop_front();
                }
                pipeline.line_buffer.push_back(trimmed.to_string());
                pipeline.last_line_time = Some(now);
            }

            let outcome = pipeline.dispatcher.dispatch_at(line, now);
            let report = match outcome {
                Dispatched::Bearing(_) => {
                    let params = self.params.snapshot();
                    match report::build_at(pipeline.dispatcher.readings(), &params, now) {
                        Ok(report) => {
                            pipeline.last_sent = Some(report.clone());
                            Some(report)
                        }
                        Err(e) => {
                            log::error!("report after bearing failed: {}", e);
                            None
                        }
                    }
                }
                _ => None,
            };
            (outcome, report)
        };

        // Pipeline lock released; a slow sink does not hold up decoding
        if let Some(report) = report {
            let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = sink.send(&report) {
                log::warn!("report send failed: {}", e);
            }
        }

        outcome
    }

    /// Report built from the latest readings, or `no report` before the first decode
    pub fn get_readings(&self) -> Result<FusedReport, ReportError> {
        self.get_readings_at(Utc::now())
    }

    pub fn get_readings_at(&self, now: DateTime<Utc>) -> Result<FusedReport, ReportError> {
        let params = self.params.snapshot();
        let pipeline = self.lock_pipeline();
        report::build_at(pipeline.dispatcher.readings(), &params, now)
    }

    /// Most recent report handed to the sink
    pub fn last_sent_report(&self) -> Option<FusedReport> {
        self.lock_pipeline().last_sent.clone()
    }

    pub fn set_parameters(&self, update: &Value) -> Result<Vec<ParamKey>, ParamError> {
        self.params.apply(update)
    }

    pub fn parameters(&self) -> Parameters {
        self.params.snapshot()
    }

    pub fn reset_parameters(&self) -> Parameters {
        self.params.reset();
        self.params.snapshot()
    }

    pub fn parameter_store(&self) -> &ParameterStore {
        &self.params
    }

    pub fn counts(&self) -> DispatchCounts {
        self.lock_pipeline().dispatcher.counts()
    }

    pub fn last_line_time(&self) -> Option<DateTime<Utc>> {
        self.lock_pipeline().last_line_time
    }

    pub fn line_buffer(&self) -> Vec<String> {
        self.lock_pipeline().line_buffer.iter().cloned().collect()
    }

    pub fn clear_line_buffer(&self) {
        self.lock_pipeline().line_buffer.clear();
    }
}
