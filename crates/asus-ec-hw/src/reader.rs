//! Sensor decoding over the paged register file.

use crate::catalog::{RegisterWidth, SensorCatalog, SensorDescriptor};
use crate::device::RegisterDevice;
use crate::{Error, Result, Snapshot, DEFAULT_PAGE, PAGE_SELECT_OFFSET, PAGE_SIZE};
use tracing::{debug, warn};

/// Exclusive use of the register file for one decoding pass.
///
/// Leaves the controller on the default page when it goes away, whether the
/// pass completed or bailed out early.
struct PageSession<'a, D: RegisterDevice> {
    device: &'a mut D,
    current: Option<u8>,
    finished: bool,
}

impl<'a, D: RegisterDevice> PageSession<'a, D> {
    fn begin(device: &'a mut D) -> Self {
        Self {
            device,
            current: None,
            finished: false,
        }
    }

    fn current(&self) -> Option<u8> {
        self.current
    }

    fn select(&mut self, page: u8) -> Result<()> {
        debug!("Selecting EC page {}", page);
        self.device.write_byte(PAGE_SELECT_OFFSET, page)?;
        self.current = Some(page);
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        let data = self.device.read_all()?;
        if data.len() < PAGE_SIZE {
            return Err(Error::TruncatedRead {
                expected: PAGE_SIZE,
                actual: data.len(),
            });
        }
        Ok(data)
    }

    /// Restores the default page and reports whether that worked.
    fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.device.write_byte(PAGE_SELECT_OFFSET, DEFAULT_PAGE)
    }
}

impl<D: RegisterDevice> Drop for PageSession<'_, D> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.device.write_byte(PAGE_SELECT_OFFSET, DEFAULT_PAGE) {
            warn!("Failed to restore EC page {}: {}", DEFAULT_PAGE, e);
        }
    }
}

/// Decodes a board's sensors from an EC register file.
pub struct EcReader<D: RegisterDevice> {
    device: D,
    sensors: Vec<SensorDescriptor>,
    /// Sensor indices grouped by page, first-seen page first.
    plan: Vec<usize>,
}

impl<D: RegisterDevice> EcReader<D> {
    /// Creates a reader for an explicit sensor list.
    pub fn new(device: D, sensors: Vec<SensorDescriptor>) -> Result<Self> {
        SensorCatalog::validate("custom", &sensors)?;
        let plan = read_plan(&sensors);
        Ok(Self {
            device,
            sensors,
            plan,
        })
    }

    /// Creates a reader for a board in the catalog.
    pub fn for_board(device: D, catalog: &SensorCatalog, board: &str) -> Result<Self> {
        let sensors = catalog.get(board)?.to_vec();
        debug!("Using {} sensors for board {}", sensors.len(), board);
        Self::new(device, sensors)
    }

    /// Sensors in catalog order.
    pub fn sensors(&self) -> &[SensorDescriptor] {
        &self.sensors
    }

    /// Consumes the reader, returning the device.
    pub fn into_device(self) -> D {
        self.device
    }

    /// Reads every sensor once and returns the formatted readings.
    ///
    /// Each page is selected once per pass. The page-select register is
    /// returned to page 0 afterwards, including when the pass fails.
    pub fn update(&mut self) -> Result<Snapshot> {
        let mut session = PageSession::begin(&mut self.device);
        let mut data = session.read()?;
        let mut values = vec![0u16; self.sensors.len()];

        for &index in &self.plan {
            let sensor = &self.sensors[index];
            if session.current() != Some(sensor.page) {
                session.select(sensor.page)?;
                data = session.read()?;
            }
            values[index] = decode(&data, sensor);
        }
        session.finish()?;

        let mut snapshot = Snapshot::new();
        for (sensor, value) in self.sensors.iter().zip(values) {
            snapshot.insert(sensor.name.as_str(), format_reading(value, &sensor.unit));
        }
        Ok(snapshot)
    }
}

fn read_plan(sensors: &[SensorDescriptor]) -> Vec<usize> {
    let mut pages: Vec<u8> = Vec::new();
    for sensor in sensors {
        if !pages.contains(&sensor.page) {
            pages.push(sensor.page);
        }
    }
    pages
        .iter()
        .flat_map(|&page| {
            sensors
                .iter()
                .enumerate()
                .filter(move |(_, s)| s.page == page)
                .map(|(i, _)| i)
        })
        .collect()
}

/// Assembles a register value; words are big-endian.
fn decode(data: &[u8], sensor: &SensorDescriptor) -> u16 {
    let offset = sensor.offset as usize;
    match sensor.size {
        RegisterWidth::Byte => u16::from(data[offset]),
        RegisterWidth::Word => u16::from_be_bytes([data[offset], data[offset + 1]]),
    }
}

fn format_reading(value: u16, unit: &str) -> String {
    format!("{} {}", value, unit)
}
