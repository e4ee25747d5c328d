//! Keyboard interception and exit-combination detection
//!
//! Raw hook events flow through normalization, the pressed-key tracker,
//! the combination matcher and the blocking policy, in that order.

pub mod clock;
pub mod hook;
mod guard;
mod keys;
mod matcher;
mod policy;
mod tracker;

pub use guard::{GuardState, GuardStatus, KeyboardGuard};
pub use hook::{HookError, KeyHandler, KeyboardHook, ManualHook, PlatformHook, UnsupportedHook};
pub use keys::{
    normalize, CanonicalKey, ComboKey, KeyAction, Modifier, NamedKey, NormalizedEvent, RawKey,
    RawKeyEvent, Side,
};
pub use matcher::{CombinationMatcher, ExitCombination};
pub use policy::{BlockPolicy, BlockRule, Verdict};
pub use tracker::{HeldKeys, PressedKeyTracker};
