//! Integer arithmetic commands.
//!
//! Every operand is parsed as a 32-bit signed integer and the running result
//! is kept in an `i64`, so the product of two operands always fits. Longer
//! argument lists are folded left to right with overflow checks.

use super::CommandError;
use crate::connection::Session;

/// MULT a b [n ...]
pub fn mult(session: &mut Session, args: &[String]) -> Result<(), CommandError> {
    let product = fold("MULT", args, 2, |acc, n| {
        acc.checked_mul(n).ok_or(CommandError::Overflow)
    })?;
    session.send_response(product.to_string());
    Ok(())
}

/// ADD n [n ...]
pub fn add(session: &mut Session, args: &[String]) -> Result<(), CommandError> {
    let sum = fold("ADD", args, 1, |acc, n| {
        acc.checked_add(n).ok_or(CommandError::Overflow)
    })?;
    session.send_response(sum.to_string());
    Ok(())
}

/// SUB a b [n ...]
pub fn sub(session: &mut Session, args: &[String]) -> Result<(), CommandError> {
    let difference = fold("SUB", args, 2, |acc, n| {
        acc.checked_sub(n).ok_or(CommandError::Overflow)
    })?;
    session.send_response(difference.to_string());
    Ok(())
}

/// DIV a b [n ...]
///
/// Division truncates toward zero. Extra operands keep dividing the running
/// quotient, so `DIV 100 5 2` answers `10`.
pub fn div(session: &mut Session, args: &[String]) -> Result<(), CommandError> {
    let quotient = fold("DIV", args, 2, |acc, n| {
        if n == 0 {
            return Err(CommandError::DivisionByZero);
        }
        acc.checked_div(n).ok_or(CommandError::Overflow)
    })?;
    session.send_response(quotient.to_string());
    Ok(())
}

/// Parses one operand.
fn parse_operand(token: &str) -> Result<i64, CommandError> {
    token
        .parse::<i32>()
        .map(i64::from)
        .map_err(|_| CommandError::InvalidInteger(token.to_string()))
}

/// Validates arity, parses every operand, then folds them left to right.
///
/// All operands are parsed before any arithmetic so that a bad token is
/// reported even when an earlier step would have overflowed.
fn fold<F>(name: &'static str, args: &[String], min_args: usize, op: F) -> Result<i64, CommandError>
where
    F: Fn(i64, i64) -> Result<i64, CommandError>,
{
    if args.len() < min_args {
        return Err(CommandError::WrongArity(name));
    }

    let operands = args
        .iter()
        .map(|arg| parse_operand(arg))
        .collect::<Result<Vec<_>, _>>()?;

    let mut iter = operands.into_iter();
    let first = iter.next().ok_or(CommandError::WrongArity(name))?;
    iter.try_fold(first, op)
}
