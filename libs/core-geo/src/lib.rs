// [libs/core-geo/src/lib.rs]
/*!
 * APARATO: CORE GEOSPATIAL ENGINE (ESTRATO L1)
 * RESPONSABILIDAD: ARITMÉTICA PURA DE DISTANCIA Y CONTENCIÓN
 *
 * Sin acceso a red, disco o estado global — funciones puras sobre los
 * tipos de dominio, en el mismo espíritu que el resto del estrato L1:
 * entrada determinista, salida determinista, sin efectos colaterales.
 * =================================================================
 */

pub mod distance;
pub mod containment;
pub mod index;

pub use distance::haversine_meters;
pub use containment::{point_in_polygon, point_in_circle, distance_to_polyline};
pub use index::{GeofenceIndex, GeofenceSnapshot, Membership};
