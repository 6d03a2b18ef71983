//! SFS tag repertoire (spec.md §4.D / §6.4). Values are the real R `SEXPTYPE`
//! integers the original source pins in `original_source/src/sfs.c`, since
//! spec.md leaves the exact constants unspecified beyond "mirrored at design
//! level" and the original resolves that silence.

pub const NILSXP: u8 = 0;
pub const SYMSXP: u8 = 1;
pub const LISTSXP: u8 = 2;
pub const CLOSXP: u8 = 3;
pub const ENVSXP: u8 = 4;
pub const LANGSXP: u8 = 6;
pub const CHARSXP: u8 = 9;
pub const LGLSXP: u8 = 10;
pub const INTSXP: u8 = 13;
pub const REALSXP: u8 = 14;
pub const CPLXSXP: u8 = 15;
pub const STRSXP: u8 = 16;
pub const VECSXP: u8 = 19;
pub const RAWSXP: u8 = 24;
pub const S4SXP: u8 = 25;

/// Virtual tag denoting an attribute-prefix record (spec.md §4.D).
pub const ATTRSXP: u8 = 255;

pub fn name(tag: u8) -> &'static str {
    match tag {
        NILSXP => "NIL",
        SYMSXP => "SYM",
        LISTSXP => "LIST",
        CLOSXP => "CLO",
        ENVSXP => "ENV",
        LANGSXP => "LANG",
        CHARSXP => "CHAR",
        LGLSXP => "LGL",
        INTSXP => "INT",
        REALSXP => "REAL",
        CPLXSXP => "CPLX",
        STRSXP => "STR",
        VECSXP => "VEC",
        RAWSXP => "RAW",
        S4SXP => "S4",
        ATTRSXP => "ATTRSXP",
        _ => "UNKNOWN",
    }
}
