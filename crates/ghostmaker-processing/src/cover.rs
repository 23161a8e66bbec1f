use ghostmaker_core::models::Rendition;

/// Smallest width a rendition needs to serve as a cover image.
pub const COVER_MIN_WIDTH: u32 = 640;

/// Pick the cover image from renditions given in ladder order: the first one at least
/// `COVER_MIN_WIDTH` wide, otherwise the widest. Upload order plays no part.
pub fn select_cover_candidate(renditions: &[Rendition]) -> Option<Rendition> {
    renditions
        .iter()
        .find(|r| r.width >= COVER_MIN_WIDTH)
        .or_else(|| renditions.iter().max_by_key(|r| (r.width, r.height)))
        .cloned()
}
