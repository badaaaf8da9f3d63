//! Command value: an argument vector plus target-shard routing hints.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootCommand {
    Agg,
    Read,
    Del,
    Profile,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("cursor command rewrite expects exactly 4 arguments, got {0}")]
    MalformedCursorCommand(usize),
    #[error("argument index {0} out of bounds for command with {1} arguments")]
    OutOfBounds(usize, usize),
}

/// Ordered sequence of byte-string arguments plus coordinator routing
/// metadata. Cheap to clone per-shard (one clone per fan-out target).
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    args: Vec<Vec<u8>>,
    pub target_shard: Option<u32>,
    pub target_slot: Option<u16>,
    pub protocol: u8,
    pub root_command: RootCommand,
    pub for_cursor: bool,
    pub for_profiling: bool,
    pub depleted: bool,
    pub slots_info_arg_index: Option<usize>,
    pub dispatch_time_arg_index: Option<usize>,
    pub coord_start_time_ns: u64,
    cached: Option<Vec<u8>>,
}

impl Command {
    pub fn new(args: Vec<Vec<u8>>, root_command: RootCommand, protocol: u8) -> Self {
        Command {
            args,
            target_shard: None,
            target_slot: None,
            protocol,
            root_command,
            for_cursor: false,
            for_profiling: false,
            depleted: false,
            slots_info_arg_index: None,
            dispatch_time_arg_index: None,
            coord_start_time_ns: 0,
            cached: None,
        }
    }

    pub fn args(&self) -> &[Vec<u8>] {
        &self.args
    }

    pub fn arg(&self, idx: usize) -> Option<&[u8]> {
        self.args.get(idx).map(|v| v.as_slice())
    }

    /// Any argument mutation must drop the cached serialization.
    pub fn push_arg(&mut self, arg: impl Into<Vec<u8>>) {
        self.args.push(arg.into());
        self.cached = None;
    }

    pub fn set_arg(&mut self, idx: usize, arg: impl Into<Vec<u8>>) -> Result<(), CommandError> {
        let len = self.args.len();
        let slot = self
            .args
            .get_mut(idx)
            .ok_or(CommandError::OutOfBounds(idx, len))?;
        *slot = arg.into();
        self.cached = None;
        Ok(())
    }

    pub fn set_cached(&mut self, bytes: Vec<u8>) {
        self.cached = Some(bytes);
    }

    pub fn cached(&self) -> Option<&[u8]> {
        self.cached.as_deref()
    }

    /// Appends the `SLOTS` injected marker followed by the binary blob
    /// `[num_ranges:u32][(start:u16,end:u16) x num_ranges]` little-endian.
    pub fn inject_slots(&mut self, ranges: &[(u16, u16)]) {
        let mut blob = Vec::with_capacity(4 + ranges.len() * 4);
        blob.extend_from_slice(&(ranges.len() as u32).to_le_bytes());
        for &(start, end) in ranges {
            blob.extend_from_slice(&start.to_le_bytes());
            blob.extend_from_slice(&end.to_le_bytes());
        }
        self.push_arg("SLOTS");
        self.slots_info_arg_index = Some(self.args.len() - 1);
        self.push_arg(blob);
    }

    /// Appends `COORD_DISPATCH_TIME` followed by an ASCII decimal nanosecond
    /// integer computed as `now_ns - coord_start_time_ns + 1`.
    pub fn inject_dispatch_time(&mut self, now_ns: u64) {
        let dispatch_ns = now_ns.saturating_sub(self.coord_start_time_ns) + 1;
        self.push_arg("COORD_DISPATCH_TIME");
        self.dispatch_time_arg_index = Some(self.args.len() - 1);
        self.push_arg(dispatch_ns.to_string());
    }

    /// Rewrites a `_FT.CURSOR READ <idx> <id>` command in place into
    /// `_FT.CURSOR DEL <idx> <id>`, as the iterator does on cooperative
    /// shutdown. The command must be exactly 4 arguments.
    pub fn rewrite_cursor_to_del(&mut self) -> Result<(), CommandError> {
        if self.args.len() != 4 {
            return Err(CommandError::MalformedCursorCommand(self.args.len()));
        }
        self.set_arg(1, "DEL")?;
        self.root_command = RootCommand::Del;
        Ok(())
    }

    pub fn rewrite_cursor_to_profile(&mut self) -> Result<(), CommandError> {
        if self.args.len() != 4 {
            return Err(CommandError::MalformedCursorCommand(self.args.len()));
        }
        self.set_arg(1, "PROFILE")?;
        self.root_command = RootCommand::Profile;
        Ok(())
    }
}

/// Sharding-key position for a command name: the argument index that carries
/// the key used to route the command, or `-1` for a broadcast command.
pub fn key_position(command_name: &str) -> i32 {
    match command_name.to_ascii_uppercase().as_str() {
        "_FT.SEARCH" | "_FT.AGGREGATE" | "_FT.INFO" | "_FT.SPELLCHECK" | "_FT.CREATE"
        | "_FT.DROP" | "_FT.ALTER" | "_FT.ALIASADD" | "_FT.ALIASUPDATE" | "_FT.ALIASDEL"
        | "_FT.SUGLEN" => 1,
        "_FT.CURSOR READ" | "_FT.CURSOR DEL" | "_FT.CURSOR PROFILE" => 1,
        "_FT.DEL" | "_FT.GET" | "_FT.MGET" | "_FT.SUGADD" | "_FT.SUGGET" | "_FT.SUGDEL"
        | "_FT.DICTADD" | "_FT.DICTDEL" | "_FT.SYNUPDATE" | "_FT.SYNFORCEUPDATE" => 2,
        _ => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutating_args_drops_cache() {
        let mut cmd = Command::new(vec![b"_FT.SEARCH".to_vec()], RootCommand::Read, 2);
        cmd.set_cached(vec![1, 2, 3]);
        assert!(cmd.cached().is_some());
        cmd.push_arg("idx");
        assert!(cmd.cached().is_none());
    }

    #[test]
    fn inject_slots_little_endian_layout() {
        let mut cmd = Command::new(vec![b"_FT.SEARCH".to_vec()], RootCommand::Read, 2);
        cmd.inject_slots(&[(0, 100), (200, 300)]);
        let blob = cmd.arg(2).unwrap();
        assert_eq!(&blob[0..4], &2u32.to_le_bytes());
        assert_eq!(&blob[4..6], &0u16.to_le_bytes());
        assert_eq!(&blob[6..8], &100u16.to_le_bytes());
    }

    #[test]
    fn rewrite_cursor_read_to_del() {
        let mut cmd = Command::new(
            vec![
                b"_FT.CURSOR".to_vec(),
                b"READ".to_vec(),
                b"idx".to_vec(),
                b"42".to_vec(),
            ],
            RootCommand::Read,
            2,
        );
        cmd.rewrite_cursor_to_del().unwrap();
        assert_eq!(cmd.arg(1), Some(&b"DEL"[..]));
        assert_eq!(cmd.root_command, RootCommand::Del);
    }

    #[test]
    fn rewrite_rejects_wrong_arity() {
        let mut cmd = Command::new(vec![b"X".to_vec()], RootCommand::Read, 2);
        assert_eq!(
            cmd.rewrite_cursor_to_del(),
            Err(CommandError::MalformedCursorCommand(1))
        );
    }

    #[test]
    fn key_positions() {
        assert_eq!(key_position("_ft.search"), 1);
        assert_eq!(key_position("_FT.MGET"), 2);
        assert_eq!(key_position("_FT.UNKNOWN"), -1);
    }
}
