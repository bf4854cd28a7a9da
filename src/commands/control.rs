//! Connection-level commands that touch no data.

use super::CommandError;
use crate::connection::Session;

/// PING [message]
pub fn ping(session: &mut Session, args: &[String]) -> Result<(), CommandError> {
    if args.is_empty() {
        session.send_response("PONG");
    } else {
        session.send_response(format!("PONG {}", args.join(" ")));
    }
    Ok(())
}

/// ECHO message [...]
///
/// Tokens are rejoined with single spaces.
pub fn echo(session: &mut Session, args: &[String]) -> Result<(), CommandError> {
    if args.is_empty() {
        return Err(CommandError::WrongArity("ECHO"));
    }
    session.send_response(args.join(" "));
    Ok(())
}

/// QUIT
pub fn quit(session: &mut Session, args: &[String]) -> Result<(), CommandError> {
    if !args.is_empty() {
        return Err(CommandError::WrongArity("QUIT"));
    }
    session.send_response("BYE");
    session.close();
    Ok(())
}
