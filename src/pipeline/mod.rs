pub mod detection; // Schedule filter, text matching, point queries, geometry
pub mod prescription; // Prescription upload → parsed medicines
