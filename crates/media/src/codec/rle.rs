//! Byte-oriented run-length coding shared by the built-in codecs.
//!
//! A control byte `c < 128` is followed by `c + 1` literal bytes. A control
//! byte `c >= 128` is followed by one byte repeated `c - 125` times, so
//! runs cover 3..=130 bytes.

const MAX_LITERAL: usize = 128;
const MIN_RUN: usize = 3;
const MAX_RUN: usize = 130;

fn run_length(input: &[u8], start: usize) -> usize {
    let value = input[start];
    input[start..]
        .iter()
        .take(MAX_RUN)
        .take_while(|&&b| b == value)
        .count()
}

/// Compress `input`.
pub fn encode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() / 4 + 8);
    let mut i = 0;

    while i < input.len() {
        let run = run_length(input, i);
        if run >= MIN_RUN {
            out.push((run + 125) as u8);
            out.push(input[i]);
            i += run;
            continue;
        }

        let start = i;
        while i < input.len() && i - start < MAX_LITERAL {
            if i > start && run_length(input, i) >= MIN_RUN {
                break;
            }
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&input[start..i]);
    }

    out
}

/// Expand `input`. Fails on truncated data or when the result does not
/// have `expected_len` bytes.
pub fn decode(input: &[u8], expected_len: usize) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(expected_len);
    let mut p = 0;

    while p < input.len() {
        let control = input[p] as usize;
        p += 1;
        if control < 128 {
            let len = control + 1;
            let literal = input
                .get(p..p + len)
                .ok_or_else(|| format!("literal of {} bytes truncated at offset {}", len, p))?;
            out.extend_from_slice(literal);
            p += len;
        } else {
            let value = *input
                .get(p)
                .ok_or_else(|| format!("run truncated at offset {}", p))?;
            out.resize(out.len() + control - 125, value);
            p += 1;
        }
        if out.len() > expected_len {
            return Err(format!(
                "decoded length exceeds expected {} bytes",
                expected_len
            ));
        }
    }

    if out.len() != expected_len {
        return Err(format!(
            "decoded {} bytes, expected {}",
            out.len(),
            expected_len
        ));
    }
    Ok(out)
}
