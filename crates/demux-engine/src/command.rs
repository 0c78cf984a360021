// crates/demux-engine/src/command.rs
//
// §9 Design Notes: the global mutable flags the worker loop reacts to
// (tracks_switched, seeking, force_cache_update) stay as plain fields on
// Inner — they're observed state, not requests. The one thing that is
// genuinely a request is the "run this with the lock held, on the worker's
// turn" thunk (§4.3 step 1), used by control paths that need to touch
// Producer-adjacent state without racing the worker. Modeled as a tiny
// one-variant command bus rather than a bare closure field so a second
// command kind can be added later without reshaping `Inner`.

use crate::cache::Inner;

pub enum Command {
    RunWithInner(Box<dyn FnOnce(&mut Inner) + Send>),
}

impl Command {
    pub fn run(self, inner: &mut Inner) {
        match self {
            Command::RunWithInner(f) => f(inner),
        }
    }
}
