//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use gurney::charts::{Chart, ChartRenderer, ChartTheme};
use gurney::dataset::Dataset;
use gurney::error::{GurneyError, Result};
use polars::prelude::*;
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Renders every chart as the same 1x1 PNG and remembers what it was asked for.
#[derive(Debug, Default)]
pub struct CountingRenderer {
    calls: AtomicUsize,
    kinds: Mutex<Vec<String>>,
}

impl CountingRenderer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn kinds(&self) -> Vec<String> {
        self.kinds.lock().expect("renderer lock").clone()
    }
}

impl ChartRenderer for CountingRenderer {
    fn render(&self, chart: &Chart, _theme: &ChartTheme) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.kinds
            .lock()
            .expect("renderer lock")
            .push(chart.data.kind().to_owned());
        Ok(tiny_png())
    }
}

/// Counts like [`CountingRenderer`] but refuses one chart kind.
#[derive(Debug)]
pub struct FailingRenderer {
    pub inner: CountingRenderer,
    pub refused: &'static str,
}

impl FailingRenderer {
    pub fn refusing(kind: &'static str) -> Self {
        Self {
            inner: CountingRenderer::default(),
            refused: kind,
        }
    }
}

impl ChartRenderer for FailingRenderer {
    fn render(&self, chart: &Chart, theme: &ChartTheme) -> Result<Vec<u8>> {
        if chart.data.kind() == self.refused {
            return Err(GurneyError::Chart(format!("cannot draw {}", self.refused)));
        }
        self.inner.render(chart, theme)
    }
}

pub fn tiny_png() -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image::RgbImage::from_pixel(1, 1, image::Rgb([255, 255, 255]))
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode 1x1 png");
    out.into_inner()
}

const DISCHARGES: [&str; 12] = [
    "2023-01-15", "2023-02-10", "2023-03-05", "2023-01-20", "2023-02-25", "2023-03-30",
    "2024-01-08", "2024-02-14", "2024-03-02", "2024-01-28", "2024-02-03", "2024-03-19",
];
const ADMISSIONS: [&str; 12] = [
    "2023-01-10", "2023-02-08", "2023-03-01", "2023-01-20", "2023-02-11", "2023-03-22",
    "2024-01-02", "2024-02-10", "2024-02-27", "2024-01-25", "2024-02-01", "2024-03-10",
];
const AGES: [f64; 12] = [4.0, 17.0, 25.0, 33.0, 47.0, 58.0, 61.0, 72.0, 85.0, 12.0, 39.0, 66.0];
const DIAGNOSES: [&str; 12] = [
    "J18 Neumonia",
    "S72 Fractura de femur",
    "I21 Infarto agudo",
    "J18 Neumonia",
    "E11 Diabetes",
    "I21 Infarto agudo",
    "J18 Neumonia",
    "S72 Fractura de femur",
    "N39 Infeccion urinaria",
    "J45 Asma",
    "E11 Diabetes",
    "I21 Infarto agudo",
];
const AMOUNTS: [f64; 12] = [
    1200.0, 3400.0, 5100.0, 900.0, 2200.0, 4800.0, 1500.0, 3900.0, 1800.0, 700.0, 2600.0, 5300.0,
];
const BASE_PRICES: [f64; 12] = [
    1000.0, 3000.0, 5000.0, 1000.0, 2000.0, 5000.0, 1300.0, 3500.0, 1600.0, 800.0, 2500.0, 5000.0,
];
const HOSPITALS: [&str; 12] = [
    "Hospital Base Valdivia",
    "Hospital de Osorno",
    "Hospital San José",
    "Hospital Base Valdivia",
    "Hospital de Osorno",
    "Hospital San José",
    "Hospital Base Valdivia",
    "Hospital de Osorno",
    "Hospital San José",
    "Hospital Base Valdivia",
    "Hospital de Osorno",
    "Hospital Base Valdivia",
];
const REASONS: [&str; 12] = [
    "Domicilio", "Domicilio", "Derivación", "Domicilio", "Fallecido", "Domicilio",
    "Domicilio", "Derivación", "Domicilio", "Domicilio", "Domicilio", "Fallecido",
];
const ADMISSION_TYPES: [&str; 12] = [
    "Urgencia", "Programada", "Urgencia", "Urgencia", "Programada", "Urgencia",
    "Urgencia", "Programada", "Urgencia", "Urgencia", "Programada", "Urgencia",
];
const ACTIVITIES: [&str; 12] = [
    "Hospitalizado",
    "Hospitalizado",
    "Hospitalizado",
    "Cirugía Mayor Ambulatoria",
    "Hospitalizado",
    "Hospitalizado",
    "Hospitalizado",
    "Hospitalizado",
    "Hospitalizado",
    "Cirugía Mayor Ambulatoria",
    "Hospitalizado",
    "Hospitalizado",
];
const INSURANCE: [&str; 12] = [
    "FONASA A", "FONASA B", "ISAPRE", "FONASA A", "FONASA B", "ISAPRE",
    "FONASA A", "FONASA B", "ISAPRE", "FONASA A", "FONASA B", "ISAPRE",
];
const SEXES: [&str; 12] = [
    "Hombre", "Mujer", "Hombre", "Mujer", "Hombre", "Mujer",
    "Hombre", "Mujer", "Hombre", "Mujer", "Hombre", "Mujer",
];
const WEIGHTS: [f64; 12] = [0.8, 1.9, 2.6, 0.7, 1.1, 2.4, 0.9, 2.0, 1.2, 0.5, 1.0, 2.7];
const STAYS: [f64; 12] = [5.0, 2.0, 4.0, 0.0, 14.0, 8.0, 6.0, 4.0, 3.0, 3.0, 2.0, 9.0];

/// Discharge-centric export carrying every known field.
pub fn maximal_discharges() -> Dataset {
    let episodes: Vec<String> = (1..=12).map(|i| format!("E{i:04}")).collect();
    let frame = df!(
        "Fecha de egreso completa" => DISCHARGES,
        "Fecha de ingreso completa" => ADMISSIONS,
        "Edad en años" => AGES,
        "Diag 01 Principal (cod+des)" => DIAGNOSES,
        "Valor a Pagar" => AMOUNTS,
        "Valor Precio Base" => BASE_PRICES,
        "Hospital de Egreso (Descripción)" => HOSPITALS,
        "Motivo Egreso (Descripción)" => REASONS,
        "Tipo Ingreso (Descripción)" => ADMISSION_TYPES,
        "Tipo Actividad (Descripción)" => ACTIVITIES,
        "Prevision (Desc)" => INSURANCE,
        "Sexo (Desc)" => SEXES,
        "Peso GRD" => WEIGHTS,
        "Estancia del Episodio" => STAYS,
        "Episodio" => episodes
    )
    .expect("maximal fixture");
    Dataset::from_frame("egresos_2024.csv", frame)
}

/// The smallest dataset any dialect accepts: the four episode-centric
/// required columns.
pub fn minimal_episodes() -> Dataset {
    let frame = df!(
        "Fecha Egreso" => DISCHARGES,
        "Edad en Años" => AGES,
        "DG01 principal (descripcion)" => DIAGNOSES,
        "Valor a Pagar" => AMOUNTS
    )
    .expect("minimal fixture");
    Dataset::from_frame("episodios_minimo.csv", frame)
}

/// Episode-centric export with its optional columns.
pub fn episodes() -> Dataset {
    let frame = df!(
        "Fecha Egreso" => DISCHARGES,
        "Fecha Ingreso" => ADMISSIONS,
        "Edad en Años" => AGES,
        "DG01 principal (descripcion)" => DIAGNOSES,
        "Valor a Pagar" => AMOUNTS,
        "Hospital (Descripción)" => HOSPITALS,
        "Tipo Ingreso" => ADMISSION_TYPES,
        "Sexo" => SEXES,
        "Peso GRD medio" => WEIGHTS,
        "Estancia del episodio" => STAYS
    )
    .expect("episode fixture");
    Dataset::from_frame("episodios_2024.csv", frame)
}

/// `dataset` without column `label`.
pub fn without(dataset: &Dataset, label: &str) -> Dataset {
    let frame = dataset.frame().drop(label).expect("column to drop");
    Dataset::from_frame(dataset.name(), frame)
}
