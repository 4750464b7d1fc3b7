//! Flashable firmware image: AT/PS2 receiver -> Set 2 decoder -> layer
//! engine -> HID boot-keyboard report, running on one RP2040 core under
//! RTIC (ยง0, ยง6 "Compile-time configuration"). Board bring-up (clocks,
//! pins, the PIO program's bit timing) is a per-keyboard integration
//! concern and is the one part of this file reviewed by inspection rather
//! than exercised by `cargo test` (no `thumbv6m-none-eabi` target in this
//! checkout); everything downstream of `on_frame`/`feed` is the same code
//! the host test suite already drives.
//!
//! Swapping `proto-xt`/`proto-amiga`/`proto-m0110` in for `proto-at-ps2`
//! swaps the `Receiver`/decoder types below for their counterparts in
//! [`retrowire::protocol`]; the rest of the pipeline (D through H) is
//! unchanged, which is why only one wiring is fleshed out here.

#![no_main]
#![no_std]

use defmt_rtt as _;
use panic_probe as _;

use retrowire::board::rp2040::RpPioEngine;
use retrowire::config::{ConfigFacade, ConfigError, KeymapIdentity, KvStore};
use retrowire::decoder::{self, Set2Decoder};
use retrowire::hid::{ConsumerAggregator, HidAggregator, LockLeds};
use retrowire::keymap::{is_layer_action, Action, Keymap, LayerEngine};
use retrowire::led::LedSync;
use retrowire::protocol::at_ps2::Receiver as AtPs2Receiver;

/// The linker places this at the start of flash so the RP2040 boot ROM can
/// hand off execution (same role as the teacher's STM32 vector table, just
/// for the RP2040's second-stage bootloader).
#[link_section = ".boot2"]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;

const XTAL_HZ: u32 = 12_000_000;
const PIO_CLOCK_PIN: u8 = 2;
const PIO_DATA_PIN: u8 = 3;

/// Physical-key-code to `(row, col)` table for a minimal demo matrix.
/// A real keyboard supplies its own; ยง4.D bounds this at 16x16 regardless
/// of size.
static POSITIONS: decoder::PositionTable<4> =
    decoder::PositionTable::new([(0, 0), (0, 1), (1, 0), (1, 1)]);

static LAYERS: [[[Action; 16]; 16]; 1] = {
    let mut base = [[Action::Transparent; 16]; 16];
    base[0][0] = Action::Usage(0x04); // KEY_A
    base[0][1] = Action::Usage(0x05); // KEY_B
    base[1][0] = Action::Usage(0xE1); // LShift
    base[1][1] = Action::Usage(0x06); // KEY_C
    [base]
};
static KEYMAP: Keymap = Keymap::new(&LAYERS, &[]);

/// No flash driver is in scope (ยง1 "persistent config backing store
/// (interface only)"); this satisfies [`KvStore`] entirely in RAM so
/// [`ConfigFacade`] has a real collaborator to drive.
struct RamKv {
    layer_state: Option<heapless::Vec<u8, 32>>,
    settings: Option<heapless::Vec<u8, 32>>,
}

impl RamKv {
    const fn new() -> Self {
        RamKv {
            layer_state: None,
            settings: None,
        }
    }

    fn slot(&mut self, key: &str) -> &mut Option<heapless::Vec<u8, 32>> {
        if key == retrowire::config::KEY_LAYER_STATE {
            &mut self.layer_state
        } else {
            &mut self.settings
        }
    }
}

impl KvStore for RamKv {
    fn read(&mut self, key: &str, out: &mut [u8]) -> Option<usize> {
        let data = self.slot(key).as_ref()?;
        let n = data.len().min(out.len());
        out[..n].copy_from_slice(&data[..n]);
        Some(n)
    }

    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let mut buf = heapless::Vec::new();
        buf.extend_from_slice(data).map_err(|_| ConfigError::BadVersion)?;
        *self.slot(key) = Some(buf);
        Ok(())
    }

    fn erase(&mut self, key: &str) {
        *self.slot(key) = None;
    }
}

#[rtic::app(device = rp2040_hal::pac, peripherals = true)]
mod app {
    use super::*;
    use rp2040_hal::gpio::{FunctionPio0, Pins};
    use rp2040_hal::pio::PIOExt;
    use rp2040_hal::timer::{Alarm, Alarm0};
    use rp2040_hal::usb::UsbBus;
    use rp2040_hal::{Sio, Timer, Watchdog};
    use fugit::ExtU32;
    use usb_device::bus::UsbBusAllocator;
    use usb_device::device::{StringDescriptors, UsbDevice, UsbDeviceBuilder, UsbVidPid};
    use usb_device::LangID;
    use usbd_hid::descriptor::{KeyboardReport, MediaKeyboardReport, SerializedDescriptor};
    use usbd_hid::hid_class::HIDClass;

    type Sm0 = (rp2040_hal::pac::PIO0, rp2040_hal::pio::SM0);

    #[shared]
    struct Shared {
        usb_dev: UsbDevice<'static, UsbBus>,
        usb_class: HIDClass<'static, UsbBus>,
        consumer_class: HIDClass<'static, UsbBus>,
        receiver: AtPs2Receiver<RpPioEngine<Sm0>>,
        led_sync: LedSync,
        hid: HidAggregator,
        consumer: ConsumerAggregator,
        layers: LayerEngine,
    }

    #[local]
    struct Local {
        decoder: Set2Decoder,
        config: ConfigFacade<RamKv>,
        timer: Timer,
        alarm: Alarm0,
        shift_held: bool,
    }

    #[init]
    fn init(c: init::Context) -> (Shared, Local, init::Monotonics) {
        static mut USB_BUS: Option<UsbBusAllocator<UsbBus>> = None;

        let mut resets = c.device.RESETS;
        let mut watchdog = Watchdog::new(c.device.WATCHDOG);
        let clocks = rp2040_hal::clocks::init_clocks_and_plls(
            XTAL_HZ,
            c.device.XOSC,
            c.device.CLOCKS,
            c.device.PLL_SYS,
            c.device.PLL_USB,
            &mut resets,
            &mut watchdog,
        )
        .ok()
        .unwrap();

        let mut timer = Timer::new(c.device.TIMER, &mut resets, &clocks);
        let now_ms = retrowire::board::rp2040::now_ms(&timer);

        let sio = Sio::new(c.device.SIO);
        let pins = Pins::new(c.device.IO_BANK0, c.device.PADS_BANK0, sio.gpio_bank0, &mut resets);
        let _clock_pin = pins.gpio2.into_function::<FunctionPio0>();
        let _data_pin = pins.gpio3.into_function::<FunctionPio0>();

        let (mut pio, sm0, _, _, _) = c.device.PIO0.split(&mut resets);
        // Generic digital shift-in; the real bit timing (start/parity/stop
        // framing) is decoded in software by `Receiver::on_frame` -- this
        // program only samples the data line on the protocol's clock edge
        // (ยง3 `PioEngine`: "the narrow digital contract").
        let program = pio::pio_asm!(
            ".wrap_target",
            "wait 0 gpio 2",
            "in pins, 1",
            "wait 1 gpio 2",
            ".wrap",
        )
        .program;
        let installed = pio.install(&program).unwrap();
        let (sm, rx, tx) = rp2040_hal::pio::PIOBuilder::from_installed_program(installed)
            .in_pin_base(PIO_DATA_PIN)
            .autopush(true)
            .push_threshold(8)
            .build(sm0);
        let sm = sm.start();
        let engine = RpPioEngine::new(sm, rx, tx);

        let receiver = AtPs2Receiver::setup(engine, now_ms).unwrap();

        let identity = KeymapIdentity {
            keyboard_id_hash: 0xDEAD_BEEF,
            layers_hash: 0xCAFE_F00D,
        };
        let mut config = ConfigFacade::new(RamKv::new(), identity);
        let cfg = config.load();
        let layers = LayerEngine::from_stack(retrowire::keymap::LayerStack {
            base: cfg.layer_base,
            momentary_mask: 0,
            oneshot: None,
            toggle_mask: cfg.layer_toggles,
        });

        let usb_bus = UsbBus::new(
            c.device.USBCTRL_REGS,
            c.device.USBCTRL_DPRAM,
            clocks.usb_clock,
            true,
            &mut resets,
        );
        unsafe {
            USB_BUS = Some(UsbBusAllocator::new(usb_bus));
        }
        let bus_ref = unsafe { USB_BUS.as_ref().unwrap() };

        let usb_class = HIDClass::new(bus_ref, KeyboardReport::desc(), 10);
        let consumer_class = HIDClass::new(bus_ref, MediaKeyboardReport::desc(), 10);
        let usb_dev = UsbDeviceBuilder::new(bus_ref, UsbVidPid(0x16c0, 0x27db))
            .strings(&[StringDescriptors::new(LangID::EN)
                .manufacturer("retrowire")
                .product("retrowire keyboard")])
            .unwrap()
            .build();

        let mut alarm = timer.alarm_0().unwrap();
        alarm.schedule(10.millis()).unwrap();
        alarm.enable_interrupt();

        (
            Shared {
                usb_dev,
                usb_class,
                consumer_class,
                receiver,
                led_sync: LedSync::new(),
                hid: HidAggregator::new(),
                consumer: ConsumerAggregator::new(),
                layers,
            },
            Local {
                decoder: Set2Decoder::new(),
                config,
                timer,
                alarm,
                shift_held: false,
            },
            init::Monotonics(),
        )
    }

    #[task(binds = USBCTRL_IRQ, priority = 2, shared = [usb_dev, usb_class, consumer_class, led_sync, hid, consumer, receiver])]
    fn usbctrl_irq(mut c: usbctrl_irq::Context) {
        let woken = (&mut c.shared.usb_dev, &mut c.shared.usb_class, &mut c.shared.consumer_class)
            .lock(|dev, class, cclass| dev.poll(&mut [class, cclass]));
        if !woken {
            return;
        }
        let mut buf = [0u8; 1];
        let got_report = c
            .shared
            .usb_class
            .lock(|class| class.pull_raw_output(&mut buf).is_ok());
        if got_report {
            let leds = LockLeds::from_bits(buf[0]);
            if let Some(cmd) = c.shared.led_sync.lock(|sync| sync.on_host_update(leds)) {
                let retrowire::led::AtPs2Command::SetLeds { caps, num, scroll } = cmd;
                c.shared
                    .receiver
                    .lock(|r| r.set_lock_leds(caps, num, scroll));
            }
        }
        let report = c.shared.hid.lock(|h| h.flush(true));
        if let Some(report) = report {
            let _ = c
                .shared
                .usb_class
                .lock(|class| class.push_input(&to_usbd_report(report)));
        }
        let consumer_report = c.shared.consumer.lock(|h| h.flush(true));
        if let Some(consumer_report) = consumer_report {
            let _ = c.shared.consumer_class.lock(|class| {
                class.push_input(&MediaKeyboardReport {
                    usage_id: consumer_report.usage,
                })
            });
        }
    }

    #[task(binds = PIO0_IRQ_0, priority = 1, local = [decoder, shift_held], shared = [receiver, hid, consumer, layers])]
    fn pio_irq(mut c: pio_irq::Context) {
        let decoder = c.local.decoder;
        let shift_held = c.local.shift_held;

        while let Some(b) = c.shared.receiver.lock(|r| r.poll_ring()) {
            let event = match decoder.feed(b) {
                Ok(Some(ev)) => ev,
                Ok(None) => continue,
                Err(retrowire::error::DecoderError::Desync(byte)) => {
                    defmt::warn!("decoder desync on byte {=u8:#x}", byte);
                    continue;
                }
            };
            let Some((row, col)) = POSITIONS.lookup(event.code) else {
                continue;
            };
            c.shared.layers.lock(|engine| {
                let action = match KEYMAP.resolve(&engine.stack, engine.fn_held(), row, col) {
                    Ok(a) => a,
                    Err(_) => return,
                };
                match event.action {
                    decoder::Action::Make => {
                        engine.on_press(action, KEYMAP.layer_count());
                        if let Action::Usage(u) = action {
                            if u == 0xE1 || u == 0xE5 {
                                *shift_held = true;
                            }
                            let (usage, _) = KEYMAP.shift_override(engine.stack.base, u, *shift_held);
                            c.shared.hid.lock(|h| h.press(usage));
                            engine.consume_oneshot();
                        } else if let Action::Consumer(u) = action {
                            c.shared.consumer.lock(|h| h.press(u));
                            engine.consume_oneshot();
                        } else if !is_layer_action(action) {
                            engine.consume_oneshot();
                        }
                    }
                    decoder::Action::Break => {
                        engine.on_release(action, KEYMAP.layer_count());
                        if let Action::Usage(u) = action {
                            if u == 0xE1 || u == 0xE5 {
                                *shift_held = false;
                            }
                            c.shared.hid.lock(|h| h.release(u));
                        } else if let Action::Consumer(u) = action {
                            c.shared.consumer.lock(|h| h.release(u));
                        }
                    }
                }
            });
        }
    }

    #[task(binds = TIMER_IRQ_0, priority = 1, local = [timer, alarm], shared = [receiver, led_sync, hid])]
    fn timer_irq(mut c: timer_irq::Context) {
        c.local.alarm.clear_interrupt();
        let now_ms = retrowire::board::rp2040::now_ms(c.local.timer);

        c.shared.receiver.lock(|r| r.task(now_ms, true));
        if let Some(key) = c.shared.led_sync.lock(|s| s.poll(now_ms)) {
            c.shared.hid.lock(|h| match key {
                retrowire::led::SyntheticKey::Press(u) => h.press(u),
                retrowire::led::SyntheticKey::Release(u) => h.release(u),
            });
        }

        c.local.alarm.schedule(10.millis()).unwrap();
    }

    fn to_usbd_report(report: retrowire::hid::BootKeyboardReport) -> KeyboardReport {
        KeyboardReport {
            modifier: report.modifier,
            reserved: 0,
            leds: 0,
            keycodes: report.keys,
        }
    }
}
