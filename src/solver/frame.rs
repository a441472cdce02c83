//! Solver wire codec.
//!
//! Frames are length-prefixed with a 4-byte big-endian count. Inside a
//! frame, the first byte is the command (requests) or status
//! (responses); everything numeric after it is little-endian. The model
//! descriptor names the variables and carries the route and constraint
//! counts so the engine can size its response without out-of-band
//! agreement.

use serde::{Deserialize, Serialize};

use super::model::ProductGroupModel;
use super::SolverError;

/// Command bytes.
pub const CMD_SOLVE: u8 = 1;
pub const CMD_MONTE_CARLO: u8 = 2;

/// Status bytes.
pub const STATUS_OPTIMAL: u8 = 0;
pub const STATUS_INFEASIBLE: u8 = 1;
pub const STATUS_ERROR: u8 = 2;

/// Upper bound on a sane frame; anything larger is a protocol error.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Optimal solve response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    pub profit: f64,
    pub tons: f64,
    pub vessels: f64,
    pub cost: f64,
    pub eff_barge: f64,
    pub route_tons: Vec<f64>,
    pub route_profits: Vec<f64>,
    pub margins: Vec<f64>,
    pub transits: Vec<f64>,
    pub shadow_prices: Vec<f64>,
}

/// Monte-carlo response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub n_scenarios: u32,
    pub n_feasible: u32,
    pub n_infeasible: u32,
    pub mean: f64,
    pub stddev: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub min: f64,
    pub max: f64,
    /// Per-variable Pearson sensitivities, in variable wire order.
    pub sensitivities: Vec<f64>,
}

// ── Encoding ─────────────────────────────────────────────────────────

fn push_descriptor(buf: &mut Vec<u8>, model: &ProductGroupModel) {
    buf.extend_from_slice(&(model.variables.len() as u16).to_le_bytes());
    for name in &model.variables {
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
    }
    buf.extend_from_slice(&(model.route_count as u32).to_le_bytes());
    buf.extend_from_slice(&(model.constraint_count as u32).to_le_bytes());
}

fn push_values(buf: &mut Vec<u8>, values: &[f64]) {
    for value in values {
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

/// `cmd=1`: descriptor, then the variables block in wire order.
pub fn encode_solve_request(model: &ProductGroupModel, values: &[f64]) -> Vec<u8> {
    let mut buf = vec![CMD_SOLVE];
    push_descriptor(&mut buf, model);
    push_values(&mut buf, values);
    buf
}

/// `cmd=2`: scenario count, then descriptor and variables block.
pub fn encode_monte_carlo_request(
    model: &ProductGroupModel,
    values: &[f64],
    n_scenarios: u32,
) -> Vec<u8> {
    let mut buf = vec![CMD_MONTE_CARLO];
    buf.extend_from_slice(&n_scenarios.to_le_bytes());
    push_descriptor(&mut buf, model);
    push_values(&mut buf, values);
    buf
}

/// Prefix a frame body with its big-endian length.
pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Validate a frame length read off the wire.
pub fn check_frame_len(len: u32) -> Result<usize, SolverError> {
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(SolverError::Protocol(format!(
            "frame length {len} out of bounds"
        )));
    }
    Ok(len as usize)
}

// ── Decoding ─────────────────────────────────────────────────────────

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SolverError> {
        let end = self.pos + n;
        if end > self.bytes.len() {
            return Err(SolverError::Protocol(format!(
                "truncated payload: wanted {n} bytes at offset {}, have {}",
                self.pos,
                self.bytes.len() - self.pos
            )));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn f64_le(&mut self) -> Result<f64, SolverError> {
        let bytes = self.take(8)?;
        Ok(f64::from_le_bytes(bytes.try_into().expect("8 bytes")))
    }

    fn u32_le(&mut self) -> Result<u32, SolverError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4 bytes")))
    }

    fn f64_vec(&mut self, n: usize) -> Result<Vec<f64>, SolverError> {
        (0..n).map(|_| self.f64_le()).collect()
    }

    fn exhausted(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

/// Decode an optimal-solve payload sized by the model's route and
/// constraint counts.
pub fn decode_solve_payload(
    payload: &[u8],
    route_count: usize,
    constraint_count: usize,
) -> Result<SolveResult, SolverError> {
    let mut r = Reader::new(payload);
    let result = SolveResult {
        profit: r.f64_le()?,
        tons: r.f64_le()?,
        vessels: r.f64_le()?,
        cost: r.f64_le()?,
        eff_barge: r.f64_le()?,
        route_tons: r.f64_vec(route_count)?,
        route_profits: r.f64_vec(route_count)?,
        margins: r.f64_vec(route_count)?,
        transits: r.f64_vec(route_count)?,
        shadow_prices: r.f64_vec(constraint_count)?,
    };
    if !r.exhausted() {
        return Err(SolverError::Protocol(
            "trailing bytes after solve payload".into(),
        ));
    }
    Ok(result)
}

/// Decode a monte-carlo payload sized by the variable count.
pub fn decode_monte_carlo_payload(
    payload: &[u8],
    variable_count: usize,
) -> Result<MonteCarloResult, SolverError> {
    let mut r = Reader::new(payload);
    let n_scenarios = r.u32_le()?;
    let n_feasible = r.u32_le()?;
    let n_infeasible = r.u32_le()?;
    let mean = r.f64_le()?;
    let stddev = r.f64_le()?;
    let p5 = r.f64_le()?;
    let p25 = r.f64_le()?;
    let p50 = r.f64_le()?;
    let p75 = r.f64_le()?;
    let p95 = r.f64_le()?;
    let min = r.f64_le()?;
    let max = r.f64_le()?;
    let _reserved = r.f64_le()?;
    let sensitivities = r.f64_vec(variable_count)?;
    if !r.exhausted() {
        return Err(SolverError::Protocol(
            "trailing bytes after monte-carlo payload".into(),
        ));
    }
    Ok(MonteCarloResult {
        n_scenarios,
        n_feasible,
        n_infeasible,
        mean,
        stddev,
        p5,
        p25,
        p50,
        p75,
        p95,
        min,
        max,
        sensitivities,
    })
}
