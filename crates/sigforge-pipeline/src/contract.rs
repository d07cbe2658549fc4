//! Stage contracts: the typed input/output pair of each stage and the
//! instruction text sent with it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use sigforge_types::{
    ProposedSignal, SignalParameters, SignalRequest, SignalSummary, Stage, ValidationOutcome,
};

/// One request/response interaction with the completion service.
pub trait StageContract {
    type Input: Serialize + Send + Sync;
    type Output: DeserializeOwned + Send;

    const STAGE: Stage;

    fn system_prompt() -> &'static str;

    /// User instruction carrying every field of `input`.
    fn render(input: &Self::Input) -> String;
}

/// Input of the summarization stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryInput {
    pub proposed_signal: ProposedSignal,
    pub validation_outcome: ValidationOutcome,
}

fn take_profit2_line(label: &str, tp2: Option<f64>) -> String {
    tp2.map(|v| format!("{label}: {v}\n")).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

pub struct GenerateStage;

impl StageContract for GenerateStage {
    type Input = SignalRequest;
    type Output = SignalParameters;

    const STAGE: Stage = Stage::Generate;

    fn system_prompt() -> &'static str {
        "You are an expert trading analyst. You propose a single promising trading \
         signal for the requested asset and time, with reasonable and strategically \
         placed take profit and stop loss levels. Respond with JSON only."
    }

    fn render(input: &SignalRequest) -> String {
        format!(
            "Based on the asset {asset} and the approximate date/time {ts}, propose a promising trading signal.\n\
             You MUST determine and output the following:\n\
             1. signalIdentifier: A concise identifier for the signal (e.g., \"{asset} - Strategy Name\").\n\
             2. timeframe: The most suitable timeframe from the allowed options.\n\
             3. tradeDirection: \"BUY\" or \"SELL\". Generally, if takeProfit1 is above entry it is BUY, if below it is SELL.\n\
             4. entryPrice: A specific entry price.\n\
             5. takeProfit1: A specific first take profit level.\n\
             6. takeProfit2: An optional second take profit level. If not applicable, omit it.\n\
             7. stopLoss: A specific stop loss level.\n\
             8. reason: A concise reason for this signal (technical/fundamental indicators).\n\
             9. exactTimestamp: The exact optimal timestamp (UTC ISO format) around or on the approximate timestamp.\n\
             \n\
             The approximate timestamp is a general guide.\n\
             Asset: {asset}\n\
             Approximate Timestamp: {ts}\n",
            asset = input.asset,
            ts = input.approximate_timestamp,
        )
    }
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

pub struct ValidateStage;

impl StageContract for ValidateStage {
    type Input = ProposedSignal;
    type Output = ValidationOutcome;

    const STAGE: Stage = Stage::Validate;

    fn system_prompt() -> &'static str {
        "You are an assistant specialized in validating trading signals for financial \
         assets. You assess confidence from historical success rates under similar \
         market conditions and the strength of the supporting indicators. Be \
         conservative. Respond with JSON only."
    }

    fn render(signal: &ProposedSignal) -> String {
        format!(
            "Analyze the following trading signal:\n\
             Signal Identifier: {id}\n\
             Asset: {asset}\n\
             Timeframe: {tf}\n\
             Trade Direction: {dir}\n\
             Entry Price: {entry}\n\
             Take Profit 1: {tp1}\n\
             {tp2}\
             Stop Loss: {sl}\n\
             Reason: {reason}\n\
             Exact Signal Timestamp (UTC): {ts}\n\
             \n\
             Assess its confidenceLevel (High, Medium, or Low), give detailed reasoning, \
             and set isValid to true only for Medium or High confidence.\n",
            id = signal.signal_identifier,
            asset = signal.asset,
            tf = signal.timeframe,
            dir = signal.trade_direction,
            entry = signal.entry_price,
            tp1 = signal.take_profit1,
            tp2 = take_profit2_line("Take Profit 2", signal.take_profit2),
            sl = signal.stop_loss,
            reason = signal.reason,
            ts = signal.exact_timestamp,
        )
    }
}

// ---------------------------------------------------------------------------
// summarize
// ---------------------------------------------------------------------------

pub struct SummarizeStage;

impl StageContract for SummarizeStage {
    type Input = SummaryInput;
    type Output = SignalSummary;

    const STAGE: Stage = Stage::Summarize;

    fn system_prompt() -> &'static str {
        "You summarize validated trading signals in one or two sentences. Respond with JSON only."
    }

    fn render(input: &SummaryInput) -> String {
        let signal = &input.proposed_signal;
        let outcome = &input.validation_outcome;
        let tp2 = signal
            .take_profit2
            .map(|v| format!(", TP2:{v}"))
            .unwrap_or_default();
        let verdict = if outcome.is_valid {
            "Validated."
        } else {
            "Not validated."
        };

        format!(
            "Generate a very concise (1-2 sentences) shortMessage for this signal and its validation.\n\
             Format: \"{id}: {dir} @ {entry} (TP1:{tp1}{tp2}, SL:{sl}). {level} confidence. {verdict}\"\n\
             \n\
             Proposed Signal:\n\
             Signal Identifier: {id}\n\
             Asset: {asset}\n\
             Timeframe: {tf}\n\
             Trade Direction: {dir}\n\
             Entry Price: {entry}\n\
             Take Profit 1: {tp1}\n\
             {tp2_line}\
             Stop Loss: {sl}\n\
             Reason: {reason}\n\
             Exact Signal Timestamp (UTC): {ts}\n\
             \n\
             Validation Outcome:\n\
             Confidence Level: {level}\n\
             Reasoning: {reasoning}\n\
             Is Valid: {valid}\n",
            id = signal.signal_identifier,
            asset = signal.asset,
            tf = signal.timeframe,
            dir = signal.trade_direction,
            entry = signal.entry_price,
            tp1 = signal.take_profit1,
            tp2_line = take_profit2_line("Take Profit 2", signal.take_profit2),
            sl = signal.stop_loss,
            reason = signal.reason,
            ts = signal.exact_timestamp,
            level = outcome.confidence_level,
            reasoning = outcome.reasoning,
            valid = outcome.is_valid,
        )
    }
}
