//! I/O port gateway
//!
//! The Z80's IN/OUT instructions address a 256-entry port space separate
//! from memory. The gateway holds one optional input handler and one
//! optional output handler per port, selected by the low byte of the
//! 16-bit port address. The full address is passed through: IN A,(n)
//! drives the accumulator on A15..A8, IN r,(C) and the block I/O family
//! drive B on A15..A8, and some peripherals decode those high bits.
//!
//! A port with no input handler reads as 0xFF (floating bus); a port with
//! no output handler swallows the byte. Both cases are soft and only
//! logged at debug level. Handlers are synchronous and must not block.

use log::debug;

/// Input handler: 16-bit port address in, byte out
pub type InHandler = Box<dyn FnMut(u16) -> u8>;

/// Output handler: 16-bit port address and byte in
pub type OutHandler = Box<dyn FnMut(u16, u8)>;

/// Number of addressable ports
pub const PORT_COUNT: usize = 256;

/// Value returned for a read with no registered handler
pub const OPEN_BUS: u8 = 0xFF;

/// 256-entry input/output callback tables.
pub struct PortGateway {
    input: [Option<InHandler>; PORT_COUNT],
    output: [Option<OutHandler>; PORT_COUNT],
}

impl PortGateway {
    /// Create a gateway with no handlers registered
    pub fn new() -> Self {
        Self {
            input: std::array::from_fn(|_| None),
            output: std::array::from_fn(|_| None),
        }
    }

    /// Register an input handler for a port (replacing any previous one)
    pub fn register_in(&mut self, port: u8, handler: InHandler) {
        self.input[port as usize] = Some(handler);
    }

    /// Register an output handler for a port (replacing any previous one)
    pub fn register_out(&mut self, port: u8, handler: OutHandler) {
        self.output[port as usize] = Some(handler);
    }

    /// Remove the input handler for a port
    pub fn unregister_in(&mut self, port: u8) {
        self.input[port as usize] = None;
    }

    /// Remove the output handler for a port
    pub fn unregister_out(&mut self, port: u8) {
        self.output[port as usize] = None;
    }

    /// Read from a port. `addr` is the full 16-bit port address; the
    /// handler is selected by its low byte.
    pub fn read(&mut self, addr: u16) -> u8 {
        match &mut self.input[(addr & 0xFF) as usize] {
            Some(handler) => handler(addr),
            None => {
                debug!("IN from unhandled port {addr:#06x}, returning {OPEN_BUS:#04x}");
                OPEN_BUS
            }
        }
    }

    /// Write to a port. `addr` is the full 16-bit port address; the
    /// handler is selected by its low byte.
    pub fn write(&mut self, addr: u16, value: u8) {
        match &mut self.output[(addr & 0xFF) as usize] {
            Some(handler) => handler(addr, value),
            None => {
                debug!("OUT to unhandled port {addr:#06x} dropped (value {value:#04x})");
            }
        }
    }

    /// Drop every registered handler
    pub fn reset(&mut self) {
        for slot in self.input.iter_mut() {
            *slot = None;
        }
        for slot in self.output.iter_mut() {
            *slot = None;
        }
    }
}

impl Default for PortGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_unhandled_port_reads_open_bus() {
        let mut ports = PortGateway::new();
        assert_eq!(ports.read(0x0042), OPEN_BUS);
    }

    #[test]
    fn test_unhandled_port_write_is_dropped() {
        let mut ports = PortGateway::new();
        ports.write(0x0042, 0x12); // must not panic
    }

    #[test]
    fn test_registered_input_handler() {
        let mut ports = PortGateway::new();
        ports.register_in(0x10, Box::new(|_| 0x5A));
        assert_eq!(ports.read(0x0010), 0x5A);
        // Other ports remain unhandled
        assert_eq!(ports.read(0x0011), OPEN_BUS);
    }

    #[test]
    fn test_registered_output_handler() {
        let mut ports = PortGateway::new();
        let seen = Rc::new(Cell::new(0u8));
        let sink = Rc::clone(&seen);
        ports.register_out(0x20, Box::new(move |_, value| sink.set(value)));
        ports.write(0x0020, 0x99);
        assert_eq!(seen.get(), 0x99);
    }

    #[test]
    fn test_handler_sees_full_port_address() {
        let mut ports = PortGateway::new();
        let seen = Rc::new(Cell::new(0u16));
        let sink = Rc::clone(&seen);
        ports.register_in(
            0x34,
            Box::new(move |addr| {
                sink.set(addr);
                0x00
            }),
        );
        ports.read(0x1234);
        assert_eq!(seen.get(), 0x1234);
    }

    #[test]
    fn test_handler_selected_by_low_byte() {
        let mut ports = PortGateway::new();
        ports.register_in(0xFE, Box::new(|_| 0x7F));
        assert_eq!(ports.read(0x00FE), 0x7F);
        assert_eq!(ports.read(0xABFE), 0x7F);
    }

    #[test]
    fn test_unregister() {
        let mut ports = PortGateway::new();
        ports.register_in(0x10, Box::new(|_| 0x00));
        ports.unregister_in(0x10);
        assert_eq!(ports.read(0x0010), OPEN_BUS);
    }

    #[test]
    fn test_reset_drops_handlers() {
        let mut ports = PortGateway::new();
        ports.register_in(0x10, Box::new(|_| 0x00));
        ports.reset();
        assert_eq!(ports.read(0x0010), OPEN_BUS);
    }
}
