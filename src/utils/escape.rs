/// Escape a volume label the way udev does for `/dev/disk/by-label` names.
///
/// Alphanumeric characters (Unicode included) and `#+-.:=@_` pass through.
/// Every other character is written as `\xNN`, one escape per UTF-8 byte.
/// Boot configs on installer media reference the label in this form, e.g.
/// `inst.stage2=hd:LABEL=Fedora\x2037`.
pub fn udev_escape(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut buf = [0u8; 4];
    for ch in label.chars() {
        if ch.is_alphanumeric() || "#+-.:=@_".contains(ch) {
            out.push(ch);
        } else {
            for byte in ch.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("\\x{:02x}", byte));
            }
        }
    }
    out
}
