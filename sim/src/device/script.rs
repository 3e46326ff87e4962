//! Parsing of traffic scripts for [`super::ScriptedManager`].
use anyhow::{bail, Context, Result};
use pest::{iterators::Pair, Parser};
use pest_derive::Parser;

use super::Bus;
use crate::{axi::MAX_SIZE, utils::parse_literal};

#[derive(Parser)]
#[grammar = "device/script.pest"] // relative to src
struct ScriptParser;

/// One data beat of a scripted write burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteBeat {
    pub data: u64,
    pub strb: u8,
}

/// A scripted bus operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Read burst of `len + 1` beats.
    Read { id: u32, addr: u64, len: u8, size: u8 },
    /// Write burst, one beat per entry of `beats`.
    Write {
        id: u32,
        addr: u64,
        size: u8,
        beats: Vec<WriteBeat>,
    },
    /// Keep the bus quiet for a number of cycles.
    Idle(u64),
}

fn number(pair: Pair<'_, Rule>) -> Result<u64> {
    let (line, _) = pair.line_col();
    parse_literal(pair.as_str())
        .with_context(|| format!("line {line}: invalid number `{}`", pair.as_str()))
}

/// The number argument of an option such as `len 3`.
fn option_value(pair: Pair<'_, Rule>, max: u64) -> Result<u64> {
    let (line, _) = pair.line_col();
    let name = pair.as_str().split_whitespace().next().unwrap_or_default().to_string();
    let value = match pair.into_inner().next() {
        Some(num) => number(num)?,
        None => bail!("line {line}: missing value for `{name}`"),
    };
    if value > max {
        bail!("line {line}: `{name}` is {value:#x}, at most {max:#x} is allowed");
    }
    Ok(value)
}

fn parse_read(pair: Pair<'_, Rule>) -> Result<Op> {
    let mut it = pair.into_inner();
    let addr = number(it.next().context("read without address")?)?;
    let (mut id, mut len, mut size) = (0, 0, MAX_SIZE as u64);
    for opt in it {
        match opt.as_rule() {
            Rule::len => len = option_value(opt, u8::MAX as u64)?,
            Rule::size => size = option_value(opt, MAX_SIZE as u64)?,
            Rule::id => id = option_value(opt, u32::MAX as u64)?,
            _ => unreachable!("grammar only allows read options here"),
        }
    }
    Ok(Op::Read {
        id: id as u32,
        addr,
        len: len as u8,
        size: size as u8,
    })
}

fn parse_write(pair: Pair<'_, Rule>) -> Result<Op> {
    let (line, _) = pair.line_col();
    let mut it = pair.into_inner();
    let addr = number(it.next().context("write without address")?)?;
    let (mut id, mut size, mut strb) = (0, MAX_SIZE as u64, 0xff);
    let mut data = Vec::new();
    for opt in it {
        match opt.as_rule() {
            Rule::size => size = option_value(opt, MAX_SIZE as u64)?,
            Rule::id => id = option_value(opt, u32::MAX as u64)?,
            Rule::strb => strb = option_value(opt, u8::MAX as u64)?,
            Rule::data => {
                for num in opt.into_inner() {
                    data.push(number(num)?);
                }
            }
            _ => unreachable!("grammar only allows write options here"),
        }
    }
    if data.is_empty() {
        bail!("line {line}: write without data");
    }
    if data.len() > 256 {
        bail!("line {line}: write burst of {} beats, at most 256 are allowed", data.len());
    }
    Ok(Op::Write {
        id: id as u32,
        addr,
        size: size as u8,
        beats: data
            .into_iter()
            .map(|data| WriteBeat {
                data,
                strb: strb as u8,
            })
            .collect(),
    })
}

/// Parse a traffic script into bus operations, in script order.
pub fn parse_script(src: &str) -> Result<Vec<(Bus, Op)>> {
    let main = ScriptParser::parse(Rule::main, src)
        .context("fail to parse traffic script")?
        .next()
        .context("empty traffic script")?;

    let mut ops = Vec::new();
    for line in main.into_inner() {
        if line.as_rule() != Rule::line {
            continue;
        }
        let Some(command) = line.into_inner().next() else {
            continue;
        };
        let mut it = command.into_inner();
        let (Some(bus), Some(op)) = (it.next(), it.next()) else {
            unreachable!("grammar requires bus and operation")
        };
        let bus = match bus.as_str() {
            "mem" => Bus::Mem,
            _ => Bus::Mmio,
        };
        let op = match op.as_rule() {
            Rule::read => parse_read(op)?,
            Rule::write => parse_write(op)?,
            Rule::idle => Op::Idle(number(
                op.into_inner().next().context("idle without cycle count")?,
            )?),
            _ => unreachable!("grammar only allows read, write and idle"),
        };
        ops.push((bus, op));
    }
    Ok(ops)
}
