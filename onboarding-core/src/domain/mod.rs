//! Core domain entities
//!
//! Entities validate their own invariants and never touch I/O. Time and
//! randomness come in through [`Providers`].

pub mod billetera;
pub mod cliente;
pub mod concurrency;
pub mod consentimiento;
pub mod entity;
pub mod providers;
pub mod result;
pub mod usuario;
pub mod validation;
pub mod verificacion;

pub use billetera::{Billetera, MovimientoBilletera, NuevoMovimiento, TipoMovimiento};
pub use cliente::{
    ActividadEconomica, Cliente, DatosDireccion, DatosPersonales, Direccion,
    DocumentacionAdjunta, Genero, NuevaActividad, NuevaTarjeta, NuevaValidacion,
    ResultadoCheckton, TarjetaVinculada, TipoDocumentoCliente, ValidacionCheckton,
};
pub use concurrency::ConcurrencyToken;
pub use consentimiento::{ConsentimientoUsuario, DocumentoVersion, TipoDocumento};
pub use entity::{ActorId, Entity, EntityBase, SYSTEM_ACTOR};
pub use providers::{Clock, Providers, RandomSource};
pub use usuario::{Estatus, Usuario};
pub use verificacion::{TipoVerificacion, Verificacion2Fa};
