//! Printer actor: serializes console output from many actors.
//!
//! Each actor's text is buffered separately and written one complete
//! line at a time, so lines from different actors never interleave.
//! Whatever is left when an actor exits is flushed with a trailing
//! newline; everything is flushed when the printer itself stops.

use std::collections::HashMap;
use std::io::Write;

use crate::actor::ActorId;
use crate::blocking::BlockingContext;
use crate::error::ActorExited;
use crate::system_messages::ExitMsg;

pub(crate) type Sink = Box<dyn Write + Send>;

#[derive(Debug, Clone)]
pub(crate) enum PrinterCmd {
    Output { actor: ActorId, text: String },
    Flush { actor: ActorId },
}

/// Split off every complete line in `buf`; the unfinished tail stays.
fn take_complete_lines(buf: &mut String) -> Option<String> {
    let end = buf.rfind('\n')? + 1;
    let tail = buf.split_off(end);
    Some(std::mem::replace(buf, tail))
}

fn write_out(out: &mut Sink, text: &str) {
    if let Err(err) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
        tracing::warn!(error = %err, "printer write failed");
    }
}

fn flush_buffer(out: &mut Sink, mut buf: String) {
    if buf.is_empty() {
        return;
    }
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    write_out(out, &buf);
}

/// Body of the printer actor.
pub(crate) fn run(bctx: &mut BlockingContext, mut out: Sink) -> Result<(), ActorExited> {
    bctx.trap_exit(true);
    let mut buffers: HashMap<ActorId, String> = HashMap::new();
    loop {
        let Some(elem) = bctx.next_message(None)? else {
            continue;
        };
        if elem.msg.single::<ExitMsg>().is_some() {
            let mut rest: Vec<_> = buffers.drain().collect();
            rest.sort_by_key(|(id, _)| *id);
            for (_, buf) in rest {
                flush_buffer(&mut out, buf);
            }
            return Ok(());
        }
        match elem.msg.single::<PrinterCmd>() {
            Some(PrinterCmd::Output { actor, text }) => {
                let buf = buffers.entry(*actor).or_default();
                buf.push_str(text);
                if let Some(lines) = take_complete_lines(buf) {
                    write_out(&mut out, &lines);
                }
            }
            Some(PrinterCmd::Flush { actor }) => {
                if let Some(buf) = buffers.remove(actor) {
                    flush_buffer(&mut out, buf);
                }
            }
            None => tracing::trace!("printer ignoring unexpected message"),
        }
    }
}
