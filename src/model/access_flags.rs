//! Access and property flags for classes, fields and methods, using the class file encoding.

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SYNCHRONIZED: u16 = 0x0020;
pub const ACC_VOLATILE: u16 = 0x0040;
pub const ACC_TRANSIENT: u16 = 0x0080;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;

const KEYWORDS: [(u16, &str); 10] = [
    (ACC_PUBLIC, "public"),
    (ACC_PROTECTED, "protected"),
    (ACC_PRIVATE, "private"),
    (ACC_ABSTRACT, "abstract"),
    (ACC_STATIC, "static"),
    (ACC_FINAL, "final"),
    (ACC_TRANSIENT, "transient"),
    (ACC_VOLATILE, "volatile"),
    (ACC_SYNCHRONIZED, "synchronized"),
    (ACC_NATIVE, "native"),
];

/// Looks up the flag for a modifier keyword.
pub fn from_keyword(keyword: &str) -> Option<u16> {
    KEYWORDS.iter().find(|&&(_, k)| k == keyword).map(|&(flag, _)| flag)
}

/// Renders flags as source modifiers, in canonical order, separated by spaces.
pub fn to_keywords(flags: u16) -> String {
    KEYWORDS.iter()
        .filter(|&&(flag, _)| flags & flag != 0)
        .map(|&(_, k)| k)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_static(flags: u16) -> bool {
    flags & ACC_STATIC != 0
}

pub fn is_private(flags: u16) -> bool {
    flags & ACC_PRIVATE != 0
}

pub fn is_abstract(flags: u16) -> bool {
    flags & ACC_ABSTRACT != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords() {
        assert_eq!("public static final", to_keywords(ACC_FINAL | ACC_STATIC | ACC_PUBLIC));
        assert_eq!(Some(ACC_ABSTRACT), from_keyword("abstract"));
        assert_eq!(None, from_keyword("strictfp"));
    }
}
