//! Finding rival agent processes

/// Pids of running processes whose command line mentions `needle`, except `own_pid`.
#[cfg(target_os = "linux")]
pub fn rivals(needle: &str, own_pid: u32) -> Vec<u32> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };

    let mut pids: Vec<u32> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter(|pid| *pid != own_pid)
        .filter(|pid| {
            std::fs::read(format!("/proc/{pid}/cmdline"))
                .map(|cmdline| mentions(&cmdline, needle))
                .unwrap_or(false)
        })
        .collect();
    pids.sort_unstable();
    pids
}

#[cfg(not(target_os = "linux"))]
pub fn rivals(_needle: &str, _own_pid: u32) -> Vec<u32> {
    Vec::new()
}

/// `cmdline` is NUL-separated.
pub fn mentions(cmdline: &[u8], needle: &str) -> bool {
    !needle.is_empty()
        && cmdline
            .split(|byte| *byte == 0)
            .any(|arg| String::from_utf8_lossy(arg).contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mentions_matches_any_argument() {
        let cmdline = b"/usr/local/bin/deathmatch-agent\0Perl\0\0127.0.0.1:8080\0";
        assert!(mentions(cmdline, "deathmatch-agent"));
        assert!(!mentions(cmdline, "sleep"));
        assert!(!mentions(cmdline, ""));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_own_process_is_never_a_rival() {
        let own = std::process::id();
        let exe = std::env::current_exe().unwrap();
        let name = exe.file_name().unwrap().to_string_lossy().into_owned();
        assert!(!rivals(&name, own).contains(&own));
    }
}
