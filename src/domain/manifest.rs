//! Playlist validation and repair.
//!
//! Depending on version and build, ffmpeg has been observed to emit HLS
//! playlists missing the mandatory header tags. The transcoder's output is
//! treated as untrusted text: before a job is marked completed the playlist
//! is passed through [`repair_manifest`], which fills in whatever is
//! missing. Repair is idempotent, so re-running a job never corrupts an
//! already-valid playlist.

/// HLS protocol version written when the tag is absent.
const HLS_VERSION: u32 = 3;

/// Target segment duration in seconds, matching the transcoder profile.
pub const TARGET_DURATION_SECS: u32 = 6;

/// Return the playlist text with the mandatory header tags guaranteed
/// present, in the order header, version, target duration. Input that
/// already carries all three comes back byte-identical.
pub fn repair_manifest(content: &str) -> String {
    let mut text = content.to_owned();

    if !text.starts_with("#EXTM3U") {
        text = format!("#EXTM3U\n{}", text);
    }

    if !text.contains("#EXT-X-VERSION") {
        text = text.replacen("#EXTM3U", &format!("#EXTM3U\n#EXT-X-VERSION:{}", HLS_VERSION), 1);
    }

    if !text.contains("#EXT-X-TARGETDURATION") {
        let tag = format!("#EXT-X-TARGETDURATION:{}", TARGET_DURATION_SECS);
        let mut lines: Vec<&str> = text.split('\n').collect();
        if let Some(pos) = lines.iter().position(|l| l.starts_with("#EXT-X-VERSION")) {
            lines.insert(pos + 1, &tag);
            text = lines.join("\n");
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXTINF:6.000000,\nsegment_000.ts\n#EXT-X-ENDLIST\n";

    #[test]
    fn test_valid_manifest_untouched() {
        assert_eq!(repair_manifest(VALID), VALID);
    }

    #[test]
    fn test_repair_is_idempotent() {
        let broken = "#EXTINF:6.000000,\nsegment_000.ts\n";
        let once = repair_manifest(broken);
        let twice = repair_manifest(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_repair_inserts_all_missing_tags_in_order() {
        let broken = "#EXTINF:6.000000,\nsegment_000.ts\n";
        let fixed = repair_manifest(broken);
        let lines: Vec<&str> = fixed.lines().collect();
        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[1], "#EXT-X-VERSION:3");
        assert_eq!(lines[2], "#EXT-X-TARGETDURATION:6");
        assert_eq!(lines[3], "#EXTINF:6.000000,");
    }

    #[test]
    fn test_missing_header_only() {
        let broken = "#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\nsegment_000.ts\n";
        let fixed = repair_manifest(broken);
        assert!(fixed.starts_with("#EXTM3U\n#EXT-X-VERSION:3"));
        // Existing version and target duration are not duplicated.
        assert_eq!(fixed.matches("#EXT-X-VERSION").count(), 1);
        assert_eq!(fixed.matches("#EXT-X-TARGETDURATION").count(), 1);
    }

    #[test]
    fn test_target_duration_follows_foreign_version_tag() {
        // ffmpeg may write a different protocol version; the repair still
        // anchors the target duration after whatever version line exists.
        let broken = "#EXTM3U\n#EXT-X-VERSION:4\nsegment_000.ts\n";
        let fixed = repair_manifest(broken);
        let lines: Vec<&str> = fixed.lines().collect();
        assert_eq!(lines[1], "#EXT-X-VERSION:4");
        assert_eq!(lines[2], "#EXT-X-TARGETDURATION:6");
    }
}
